//! SMTP reply codes (RFC 5321 §4.2.3).

pub const SERVICE_READY: u16 = 220;
pub const SERVICE_CLOSING: u16 = 221;
pub const AUTH_SUCCESSFUL: u16 = 235;
pub const MAIL_OK: u16 = 250;
pub const CANNOT_VRFY: u16 = 252;
pub const AUTH_CONTINUE: u16 = 334;
pub const START_MAIL_INPUT: u16 = 354;
pub const SERVICE_NOT_AVAILABLE: u16 = 421;
pub const LOCAL_ERROR: u16 = 451;
pub const AUTH_TEMPORARY_FAILURE: u16 = 454;
pub const UNRECOGNIZED_COMMAND: u16 = 500;
pub const SYNTAX_ERROR_ARGUMENTS: u16 = 501;
pub const BAD_SEQUENCE: u16 = 503;
pub const PARAMETER_NOT_IMPLEMENTED: u16 = 504;
pub const AUTH_REQUIRED: u16 = 530;
pub const AUTH_FAILED: u16 = 535;
pub const MAILBOX_UNAVAILABLE: u16 = 550;
pub const QUOTA_EXCEEDED: u16 = 552;
pub const TRANSACTION_FAILED: u16 = 554;
