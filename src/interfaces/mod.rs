pub mod clock;
pub mod nlp;
pub mod transport;
