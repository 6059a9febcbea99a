pub mod circuit_breaker;
pub mod health;
pub mod request;
pub mod response;
pub mod retry;
