pub mod inference;
pub mod locks;
pub mod rate_limit;
pub mod recommendation;
pub mod scorer;
pub mod tags;
