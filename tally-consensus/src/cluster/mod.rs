pub mod health;
pub mod view;
