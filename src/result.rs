//! Breadcrumb helpers for `rootcause` reports raised while assembling trees.
//!
//! Leaf constructors return plain `TreeError`s; statement level operations
//! lift them into `Report<TreeError>` and add the call path with
//! [`ReportExt::attach_loc`]:
//!
//! ```ignore
//! use crate::result::ReportExt;
//!
//! fn cte_register(...) -> TreeResult<CteHandle> {
//!     name_validate(&name)?;                       // location captured here
//!     container.insert(def).attach_loc("in with")?; // breadcrumb added
//! }
//! ```
//!
//! Rendered:
//!
//! ```text
//!  ● CTE with name 'x' is already registered
//!  ├ src/tree/cte.rs:42
//!  ╰ in with at src/tree/statement.rs:47
//! ```

use rootcause::Report;
use rootcause::hooks::builtin_hooks::location::Location;

/// A message paired with the source location that attached it.
#[derive(Debug, Clone)]
pub struct LocatedAttachment {
    pub message: String,
    pub location: Location,
}

impl core::fmt::Display for LocatedAttachment {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} at {}", self.message, self.location)
    }
}

pub trait ReportExt<C> {
    type Output;

    /// Attach a message along with the caller's file:line location.
    fn attach_loc(self, message: impl Into<String>) -> Self::Output;
}

impl<C> ReportExt<C> for Report<C> {
    type Output = Report<C>;

    #[track_caller]
    fn attach_loc(self, message: impl Into<String>) -> Report<C> {
        self.attach(LocatedAttachment {
            message: message.into(),
            location: Location::caller(),
        })
    }
}

impl<T, C> ReportExt<C> for Result<T, Report<C>> {
    type Output = Result<T, Report<C>>;

    #[track_caller]
    fn attach_loc(self, message: impl Into<String>) -> Result<T, Report<C>> {
        // Location::caller() must run in this frame, not inside a closure.
        match self {
            Ok(v) => Ok(v),
            Err(e) => Err(e.attach(LocatedAttachment {
                message: message.into(),
                location: Location::caller(),
            })),
        }
    }
}

/// Convert `Result<T, E>` into `Result<T, Report<C>>` where `E: Into<C>`.
///
/// Leaf constructors return plain errors; this lifts them into a report at
/// the statement boundary so breadcrumbs can be attached.
pub trait MapIntoReport<T, E> {
    fn map_into_report<C>(self) -> Result<T, Report<C>>
    where
        E: Into<C>,
        C: std::error::Error + Send + Sync + 'static;
}

impl<T, E> MapIntoReport<T, E> for Result<T, E> {
    #[track_caller]
    fn map_into_report<C>(self) -> Result<T, Report<C>>
    where
        E: Into<C>,
        C: std::error::Error + Send + Sync + 'static,
    {
        self.map_err(|e| e.into().into())
    }
}
