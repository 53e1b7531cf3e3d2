mod dguid;

pub use dguid::DGuid;
