pub mod records;

pub use records::Entity as Records;
