//! Result of an authoritative procedure: applied or rejected with a code.

use api_types::reply::{Rejection, Reply};

use crate::ResultEngine;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    Applied(T),
    Rejected(Rejection),
}

impl<T> Outcome<T> {
    /// Folds business errors into [`Outcome::Rejected`]; conflicts and database
    /// failures stay in the `Err` arm.
    pub(crate) fn from_result(result: ResultEngine<T>) -> ResultEngine<Self> {
        match result {
            Ok(value) => Ok(Self::Applied(value)),
            Err(err) => err.into_rejection().map(Self::Rejected),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            Self::Applied(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Applied(_) => None,
            Self::Rejected(rejection) => Some(rejection),
        }
    }

    pub fn into_reply(self) -> Reply<T> {
        match self {
            Self::Applied(value) => Reply::applied(value),
            Self::Rejected(rejection) => Reply::rejected(rejection.code, rejection.reason),
        }
    }
}
