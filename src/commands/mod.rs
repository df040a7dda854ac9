pub mod classify;
pub mod locate;
mod selection;
pub mod stat;
