use std::fmt;

/// RFC 3463 enhanced mail system status code, rendered as
/// `class.subject.detail` after the numeric reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DsnStatus {
    pub class: u8,
    pub subject: u16,
    pub detail: u16,
}

impl DsnStatus {
    pub const fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self {
            class,
            subject,
            detail,
        }
    }

    pub const fn success(subject: u16, detail: u16) -> Self {
        Self::new(2, subject, detail)
    }

    pub const fn temporary(subject: u16, detail: u16) -> Self {
        Self::new(4, subject, detail)
    }

    pub const fn permanent(subject: u16, detail: u16) -> Self {
        Self::new(5, subject, detail)
    }
}

impl fmt::Display for DsnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}
