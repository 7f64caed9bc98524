//! Client traits and HTTP implementations for the forum and storefront
//! remotes. The LLM remote lives in `prospector-llm`.

pub mod forum;
pub mod storefront;

pub use forum::{ForumClient, HttpForumClient};
pub use storefront::{HttpStorefrontClient, ListedProduct, NewProduct, StorefrontClient};
