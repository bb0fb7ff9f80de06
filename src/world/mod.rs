pub mod creatures;
pub mod items;
pub mod map;
pub mod monsters;
pub mod position;
pub mod time;
pub mod viewport;
