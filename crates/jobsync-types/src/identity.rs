//! Signed-in identity: who the client is and in which role.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The role a subject is signed in as.
///
/// A subject holds exactly one role per session. The wire form is the
/// upper-snake-case name used by the portal backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Candidate browsing and applying to jobs.
    #[serde(alias = "JOBSEEKER", alias = "CANDIDATE")]
    JobSeeker,
    /// Company account publishing jobs.
    Employer,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::JobSeeker => "JOB_SEEKER",
            Role::Employer => "EMPLOYER",
        }
    }

    /// Both roles, job seeker first.
    pub fn all() -> [Role; 2] {
        [Role::JobSeeker, Role::Employer]
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a role name is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "job_seeker" | "jobseeker" | "candidate" => Ok(Role::JobSeeker),
            "employer" => Ok(Role::Employer),
            _ => Err(ParseRoleError(s.to_string())),
        }
    }
}

/// The authenticated subject bound to the real-time connection.
///
/// The bearer credential is deliberately not part of the identity: it is
/// looked up per role on every connect attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    /// Backend user id of the subject.
    pub subject_id: String,
    /// Role the subject is signed in as.
    pub role: Role,
}

impl SessionIdentity {
    /// Creates a new identity.
    pub fn new(subject_id: impl Into<String>, role: Role) -> Self {
        Self {
            subject_id: subject_id.into(),
            role,
        }
    }

    /// Returns true if `sender_id`/`sender_type` designate this identity.
    pub fn is_sender(&self, sender_id: &str, sender_type: Role) -> bool {
        self.subject_id == sender_id && self.role == sender_type
    }
}

impl fmt::Display for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.role, self.subject_id)
    }
}
