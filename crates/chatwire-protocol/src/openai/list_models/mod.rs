pub mod response;

pub use response::{CatalogArchitecture, CatalogModel, ListModelsResponse};
