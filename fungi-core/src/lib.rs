pub mod error;
pub mod ids;
pub mod identity;
pub mod model;
pub mod rules;
pub mod store;

pub use error::{LedgerError, LedgerResult, StoreError};
pub use ids::{OfferId, RecordId, ReservationId, TourId};
pub use identity::{Authorizer, Identity, NameMatchAuthorizer};
pub use model::{
    Category, NewOffer, Occupancy, Offer, Reservation, RosterKind, RosterRecord, MAX_SEATS,
};
pub use rules::LedgerRules;
pub use store::{AdmissionCheck, ChangeNotice, Collection, DocumentStore};
