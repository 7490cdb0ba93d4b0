//! UI streaming channel and the widgets it carries.

pub mod stream;
pub mod widget;

pub use stream::{StreamableUi, UiEntry, UiHandle, UiMessage, UiState, next_message_id};
pub use widget::{QuickAction, Widget};
