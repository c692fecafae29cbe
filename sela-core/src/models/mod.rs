pub mod event;
pub mod interaction;
pub mod participant;
pub mod recording;
pub mod session;

pub use event::UserEvent;
pub use interaction::{Interaction, Speaker};
pub use participant::Participant;
pub use recording::{Recording, RecordingType};
pub use session::{new_interaction_id, new_session_id, Session, TrialType};
