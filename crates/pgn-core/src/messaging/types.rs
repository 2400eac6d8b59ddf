use chrono::{DateTime, Utc};

/// One (name, value, inline) triple of a rendered summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DisplayField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl DisplayField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

/// Full content of a channel's summary post for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct SummaryContent {
    pub title: String,
    pub fields: Vec<DisplayField>,
    pub timestamp: DateTime<Utc>,
}

impl SummaryContent {
    pub fn new(title: impl Into<String>, fields: Vec<DisplayField>, timestamp: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            fields,
            timestamp,
        }
    }
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_fields: usize,
    pub max_field_value_len: usize,
    pub max_list_limit: u8,
}
