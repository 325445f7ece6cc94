mod observable;

pub use observable::{Observable, Revisioned};
