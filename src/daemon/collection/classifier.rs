use super::event::{EventClass, InputEvent, MouseButton, RawEventKind, RawInputEvent};

/// Reduces a raw notification to the class that gets counted, or `None` when it must not count.
/// Key repeats are dropped here so that holding a key down counts once.
pub fn classify(raw: &RawInputEvent) -> Option<EventClass> {
    match raw.kind {
        RawEventKind::KeyDown { autorepeat: false } => Some(EventClass::Keystroke),
        RawEventKind::KeyDown { autorepeat: true } => None,
        RawEventKind::MouseDown(MouseButton::Left | MouseButton::Right) => Some(EventClass::Click),
        RawEventKind::MouseDown(MouseButton::Other)
        | RawEventKind::MouseUp(_)
        | RawEventKind::KeyUp
        | RawEventKind::Other => None,
    }
}

pub fn to_input_event(raw: &RawInputEvent) -> Option<InputEvent> {
    classify(raw).map(|class| InputEvent {
        class,
        timestamp: raw.timestamp,
    })
}
