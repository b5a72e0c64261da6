pub mod admission;
pub mod board;
pub mod ledger;
pub mod live;
pub mod validation;

pub use board::{Board, BoardState, OfferView};
pub use ledger::SeatLedger;
pub use validation::OfferRequest;
