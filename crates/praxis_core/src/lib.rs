pub mod availability;
pub mod conflict;
pub mod domain;
pub mod events;
pub mod ports;
pub mod time;

pub use availability::{is_bookable, open_windows, BookingError, MIN_APPOINTMENT_MINUTES};
pub use conflict::{find_conflicts, overlaps};
pub use domain::{
    Appointment, AppointmentDraft, AppointmentPatch, BridgeStatus, BusinessSchedule,
    ConnectionState, Conversation, ConversationSummary, Message, MessageRole, NonWorkDate,
    WeeklySchedule,
};
pub use events::{ClientIntent, ServerEvent};
pub use ports::{BackendApi, EventChannel, EventStream, PortError, PortResult};
pub use time::{format_minutes, parse_time, TimeError, TimeRange, Weekday};
