// striders-core: contact-schedule data model, robot dynamics data, errors,
// and the trait seams to the external stage builder and trajectory optimizer.

pub mod error;
pub mod robot;
pub mod schedule;
pub mod stage;
