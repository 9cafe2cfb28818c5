pub mod import;
pub mod inspect;
