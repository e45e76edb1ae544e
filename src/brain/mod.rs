//! Deciding when to react and what to say

pub mod fallback;
pub mod gateway;
pub mod persona;
pub mod policy;


pub use fallback::FallbackResponder;
pub use gateway::{DecisionGateway, GenerationRequest, GenerationResponse, Role, TextGenerator};
pub use persona::Persona;
pub use policy::TriggerPolicy;
