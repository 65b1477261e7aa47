pub mod password;
pub mod validator;
