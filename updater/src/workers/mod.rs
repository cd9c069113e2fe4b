//! Background workers

pub mod checker;
