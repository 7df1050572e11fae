pub mod chat;
pub mod message;
pub mod part;
pub mod part_codec;

#[cfg(test)]
mod message_test;
