pub mod engine;
pub mod hub;
pub mod scheduler;
pub mod speech;


pub use engine::{Collaborators, CommentaryEngine, EngineStatus, IngestMode};
pub use hub::{BroadcastHub, ViewerConnection};
pub use speech::{Origin, SpeechSerializer, SpeechSink};
