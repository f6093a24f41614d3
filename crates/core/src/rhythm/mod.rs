pub mod clock;
pub mod library;
pub mod matcher;
pub mod pattern;
