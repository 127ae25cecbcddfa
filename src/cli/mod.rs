pub mod call;
pub mod chat;
pub mod doctor;
pub mod facts;
pub mod sessions;

pub use call::call;
pub use chat::chat;
pub use doctor::doctor;
