/// Enums describing corrections and timeline states
pub mod enums;
