use chrono::{DateTime, Local};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Other,
}

/// What the OS hook reports, before any filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    KeyDown {
        /// Synthetic repeat generated while a key is held down.
        autorepeat: bool,
    },
    KeyUp,
    MouseDown(MouseButton),
    MouseUp(MouseButton),
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub kind: RawEventKind,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    Keystroke,
    Click,
}

/// A classified event, the only thing the aggregation side ever sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub class: EventClass,
    pub timestamp: DateTime<Local>,
}
