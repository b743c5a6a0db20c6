pub mod cookies;
pub mod health;
pub mod login;
pub mod logout;
pub mod oauth;
pub mod profile;
pub mod refresh;
pub mod register;
