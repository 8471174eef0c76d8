pub mod education;
pub mod health;
pub mod patients;
pub mod plan;
