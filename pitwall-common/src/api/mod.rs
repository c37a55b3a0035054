//! Backend wire types
//!
//! Request and response bodies for the backend HTTP surface consumed by the
//! client. Pure data: no HTTP client dependencies live here.

pub mod types;

pub use types::{
    DriverBody, ErrorBody, LoginBody, MeBody, PredictRequest, PredictResponse,
    PredictedPosition, ProfileBody, RaceBody, RaceDetailBody, SignupRequest, UserRecordBody,
    UserUpsert,
};
