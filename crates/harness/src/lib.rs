pub mod archive;
pub mod faulty;
pub mod fixtures;
pub mod instance;

pub use archive::{edit_archive, edit_section, TestResult};
pub use faulty::FaultyStore;
pub use instance::{Family, TestInstance};
