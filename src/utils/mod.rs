pub mod clock;
pub mod ids;
pub mod logger;
pub mod week;
