//! # Data
//!
//! $$
//! P_{t,i} \;\longrightarrow\; r_{t,i} \;\longrightarrow\; (\mu, \Sigma)
//! $$
//!
//! Price history, aligned return matrices, weight vectors and the collaborator
//! contracts through which prices come in and results go out.

pub mod price;
pub mod provider;
pub mod returns;
pub mod weights;

pub use price::PriceBar;
pub use price::PriceSeries;
pub use provider::fetch_prices;
pub use provider::InMemoryPriceProvider;
pub use provider::MemorySink;
pub use provider::PriceHistoryProvider;
pub use provider::ResultSink;
pub use provider::StoredResult;
pub use returns::ReturnsMatrix;
pub use weights::Holding;
pub use weights::WeightVector;
