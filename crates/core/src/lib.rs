pub mod config;
pub mod domain;
pub mod errors;
pub mod normalize;

pub use domain::book::{BookMention, PurchaseLink, Recommendation};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use normalize::{
    build_url, extract_and_link, normalize, parse_recommendations, repair_links,
    NormalizerSettings, ResponseNormalizer,
};
