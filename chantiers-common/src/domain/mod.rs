//! Chantier domain: status workflows, derived fields and permissions

pub mod permissions;
pub mod progress;
pub mod status;

pub use permissions::{can, Action, ActorRole};
pub use progress::{
    anomalie_overdue, chantier_overdue, jours_restants, progression, progression_of,
    round_money, tache_overdue, tache_totals, HourEntry, TacheTotals,
};
pub use status::{
    AnomalieStatut, ChantierStatus, RoleMembre, Severite, Specialite, TacheStatus,
    TransitionError,
};
