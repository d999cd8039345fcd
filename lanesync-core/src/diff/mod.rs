pub mod alignment;
pub mod card_identity;
pub mod movement;

pub use movement::{detect_movements, detect_movements_in_text};
