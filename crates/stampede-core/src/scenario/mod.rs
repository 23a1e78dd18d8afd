pub mod io;
pub mod model;
pub mod validation;

pub use io::{read_scenario, write_scenario};
pub use model::{Scenario, Stage};
pub use validation::validate_scenario;
