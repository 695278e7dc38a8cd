//! # Courtwatch Channels
//! Messenger implementations used to deliver availability notifications.

pub mod wcf;

pub use wcf::WcfMessenger;
