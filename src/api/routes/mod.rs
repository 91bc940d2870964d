pub mod health;
pub mod publish;
pub mod read;
pub mod session;
pub mod subscribe;
pub mod unsubscribe;
