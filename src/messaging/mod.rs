// Messaging - Lock-free channels, commands and notifications

pub mod channels;
pub mod command;
pub mod notification;
