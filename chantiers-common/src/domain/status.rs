//! Status enums and their workflow transitions
//!
//! Every enum here is stored in SQLite as its canonical wire string
//! (`to_db_string`) and parsed back with `from_str`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected workflow transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid transition from {from} to {to}")]
pub struct TransitionError {
    pub from: &'static str,
    pub to: &'static str,
}

/// Lifecycle of a chantier; lots share the same domain but track it independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChantierStatus {
    #[serde(alias = "EN_ATTENTE")]
    Pending,
    #[serde(alias = "EN_COURS")]
    InProgress,
    #[serde(alias = "EN_PAUSE")]
    Paused,
    #[serde(alias = "TERMINE")]
    Done,
    #[serde(alias = "FACTURE")]
    Invoiced,
    #[serde(alias = "ANNULE")]
    Cancelled,
}

impl ChantierStatus {
    pub fn all_variants() -> [ChantierStatus; 6] {
        [
            ChantierStatus::Pending,
            ChantierStatus::InProgress,
            ChantierStatus::Paused,
            ChantierStatus::Done,
            ChantierStatus::Invoiced,
            ChantierStatus::Cancelled,
        ]
    }

    /// Parse a wire/database value (French legacy names accepted)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" | "EN_ATTENTE" => Some(ChantierStatus::Pending),
            "IN_PROGRESS" | "EN_COURS" => Some(ChantierStatus::InProgress),
            "PAUSED" | "EN_PAUSE" => Some(ChantierStatus::Paused),
            "DONE" | "TERMINE" => Some(ChantierStatus::Done),
            "INVOICED" | "FACTURE" => Some(ChantierStatus::Invoiced),
            "CANCELLED" | "ANNULE" => Some(ChantierStatus::Cancelled),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            ChantierStatus::Pending => "PENDING",
            ChantierStatus::InProgress => "IN_PROGRESS",
            ChantierStatus::Paused => "PAUSED",
            ChantierStatus::Done => "DONE",
            ChantierStatus::Invoiced => "INVOICED",
            ChantierStatus::Cancelled => "CANCELLED",
        }
    }

    /// Closed statuses never count as overdue
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            ChantierStatus::Done | ChantierStatus::Invoiced | ChantierStatus::Cancelled
        )
    }

    /// Database strings of the closed statuses, for SQL `NOT IN` filters
    pub fn closed_db_strings() -> [&'static str; 3] {
        ["DONE", "INVOICED", "CANCELLED"]
    }
}

impl Default for ChantierStatus {
    fn default() -> Self {
        ChantierStatus::Pending
    }
}

impl std::fmt::Display for ChantierStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Lifecycle of a tâche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TacheStatus {
    AFaire,
    EnCours,
    EnAttente,
    Terminee,
    Revisee,
}

impl TacheStatus {
    pub fn all_variants() -> [TacheStatus; 5] {
        [
            TacheStatus::AFaire,
            TacheStatus::EnCours,
            TacheStatus::EnAttente,
            TacheStatus::Terminee,
            TacheStatus::Revisee,
        ]
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "A_FAIRE" => Some(TacheStatus::AFaire),
            "EN_COURS" => Some(TacheStatus::EnCours),
            "EN_ATTENTE" => Some(TacheStatus::EnAttente),
            "TERMINEE" => Some(TacheStatus::Terminee),
            "REVISEE" => Some(TacheStatus::Revisee),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            TacheStatus::AFaire => "A_FAIRE",
            TacheStatus::EnCours => "EN_COURS",
            TacheStatus::EnAttente => "EN_ATTENTE",
            TacheStatus::Terminee => "TERMINEE",
            TacheStatus::Revisee => "REVISEE",
        }
    }

    /// Terminal tâches count as completed for progression
    pub fn is_terminal(&self) -> bool {
        matches!(self, TacheStatus::Terminee)
    }

    /// Check a status change requested through an update
    ///
    /// A finished tâche may only move to REVISEE; every other status is free.
    pub fn transition_to(self, next: TacheStatus) -> Result<TacheStatus, TransitionError> {
        match (self, next) {
            (TacheStatus::Terminee, TacheStatus::Terminee | TacheStatus::Revisee) => Ok(next),
            (TacheStatus::Terminee, _) => Err(TransitionError {
                from: self.to_db_string(),
                to: next.to_db_string(),
            }),
            _ => Ok(next),
        }
    }
}

impl Default for TacheStatus {
    fn default() -> Self {
        TacheStatus::AFaire
    }
}

impl std::fmt::Display for TacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Anomaly handling state: OUVERTE → ASSIGNEE → FERMEE
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalieStatut {
    Ouverte,
    Assignee,
    Fermee,
}

impl AnomalieStatut {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "OUVERTE" => Some(AnomalieStatut::Ouverte),
            "ASSIGNEE" => Some(AnomalieStatut::Assignee),
            "FERMEE" => Some(AnomalieStatut::Fermee),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            AnomalieStatut::Ouverte => "OUVERTE",
            AnomalieStatut::Assignee => "ASSIGNEE",
            AnomalieStatut::Fermee => "FERMEE",
        }
    }

    /// Open anomalies are the ones still awaiting a fix
    pub fn is_open(&self) -> bool {
        !matches!(self, AnomalieStatut::Fermee)
    }

    /// `assigner` action: OUVERTE or ASSIGNEE (reassignment) → ASSIGNEE
    pub fn assign(self) -> Result<AnomalieStatut, TransitionError> {
        match self {
            AnomalieStatut::Ouverte | AnomalieStatut::Assignee => Ok(AnomalieStatut::Assignee),
            AnomalieStatut::Fermee => Err(TransitionError {
                from: self.to_db_string(),
                to: AnomalieStatut::Assignee.to_db_string(),
            }),
        }
    }

    /// `fermer` action: only ASSIGNEE → FERMEE
    pub fn close(self) -> Result<AnomalieStatut, TransitionError> {
        match self {
            AnomalieStatut::Assignee => Ok(AnomalieStatut::Fermee),
            AnomalieStatut::Ouverte | AnomalieStatut::Fermee => Err(TransitionError {
                from: self.to_db_string(),
                to: AnomalieStatut::Fermee.to_db_string(),
            }),
        }
    }
}

impl Default for AnomalieStatut {
    fn default() -> Self {
        AnomalieStatut::Ouverte
    }
}

impl std::fmt::Display for AnomalieStatut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severite {
    Mineure,
    Majeure,
    Critique,
}

impl Severite {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MINEURE" => Some(Severite::Mineure),
            "MAJEURE" => Some(Severite::Majeure),
            "CRITIQUE" => Some(Severite::Critique),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Severite::Mineure => "MINEURE",
            Severite::Majeure => "MAJEURE",
            Severite::Critique => "CRITIQUE",
        }
    }
}

impl std::fmt::Display for Severite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Role of a membre inside its equipe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleMembre {
    Chef,
    ChefEquipe,
    Ouvrier,
    Apprenti,
    Autre,
}

impl RoleMembre {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CHEF" => Some(RoleMembre::Chef),
            "CHEF_EQUIPE" => Some(RoleMembre::ChefEquipe),
            "OUVRIER" => Some(RoleMembre::Ouvrier),
            "APPRENTI" => Some(RoleMembre::Apprenti),
            "AUTRE" => Some(RoleMembre::Autre),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            RoleMembre::Chef => "CHEF",
            RoleMembre::ChefEquipe => "CHEF_EQUIPE",
            RoleMembre::Ouvrier => "OUVRIER",
            RoleMembre::Apprenti => "APPRENTI",
            RoleMembre::Autre => "AUTRE",
        }
    }
}

impl Default for RoleMembre {
    fn default() -> Self {
        RoleMembre::Ouvrier
    }
}

impl std::fmt::Display for RoleMembre {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Trade of an equipe or sous-traitant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specialite {
    Couverture,
    Plomberie,
    Electricite,
    Menuiserie,
    Peinture,
    Carrelage,
    Cloisons,
    Maconnerie,
    Excavation,
    Autre,
}

impl Specialite {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "COUVERTURE" => Some(Specialite::Couverture),
            "PLOMBERIE" => Some(Specialite::Plomberie),
            "ELECTRICITE" => Some(Specialite::Electricite),
            "MENUISERIE" => Some(Specialite::Menuiserie),
            "PEINTURE" => Some(Specialite::Peinture),
            "CARRELAGE" => Some(Specialite::Carrelage),
            "CLOISONS" => Some(Specialite::Cloisons),
            "MACONNERIE" => Some(Specialite::Maconnerie),
            "EXCAVATION" => Some(Specialite::Excavation),
            "AUTRE" => Some(Specialite::Autre),
            _ => None,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Specialite::Couverture => "COUVERTURE",
            Specialite::Plomberie => "PLOMBERIE",
            Specialite::Electricite => "ELECTRICITE",
            Specialite::Menuiserie => "MENUISERIE",
            Specialite::Peinture => "PEINTURE",
            Specialite::Carrelage => "CARRELAGE",
            Specialite::Cloisons => "CLOISONS",
            Specialite::Maconnerie => "MACONNERIE",
            Specialite::Excavation => "EXCAVATION",
            Specialite::Autre => "AUTRE",
        }
    }
}

impl Default for Specialite {
    fn default() -> Self {
        Specialite::Autre
    }
}

impl std::fmt::Display for Specialite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chantier_status_db_roundtrip() {
        for status in ChantierStatus::all_variants() {
            assert_eq!(ChantierStatus::from_str(status.to_db_string()), Some(status));
        }
    }

    #[test]
    fn test_chantier_status_accepts_legacy_names() {
        assert_eq!(ChantierStatus::from_str("EN_COURS"), Some(ChantierStatus::InProgress));
        assert_eq!(ChantierStatus::from_str("facture"), Some(ChantierStatus::Invoiced));
        assert_eq!(ChantierStatus::from_str("bogus"), None);

        let parsed: ChantierStatus = serde_json::from_str("\"ANNULE\"").unwrap();
        assert_eq!(parsed, ChantierStatus::Cancelled);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"CANCELLED\"");
    }

    #[test]
    fn test_closed_statuses() {
        let closed: Vec<_> = ChantierStatus::all_variants()
            .into_iter()
            .filter(|s| s.is_closed())
            .map(|s| s.to_db_string())
            .collect();
        assert_eq!(closed, ChantierStatus::closed_db_strings().to_vec());
    }

    #[test]
    fn test_tache_terminee_only_moves_to_revisee() {
        let done = TacheStatus::Terminee;
        assert_eq!(done.transition_to(TacheStatus::Revisee), Ok(TacheStatus::Revisee));
        assert_eq!(done.transition_to(TacheStatus::Terminee), Ok(TacheStatus::Terminee));
        for next in [TacheStatus::AFaire, TacheStatus::EnCours, TacheStatus::EnAttente] {
            let err = done.transition_to(next).unwrap_err();
            assert_eq!(err.from, "TERMINEE");
        }
    }

    #[test]
    fn test_tache_revisee_can_reopen() {
        assert_eq!(
            TacheStatus::Revisee.transition_to(TacheStatus::EnCours),
            Ok(TacheStatus::EnCours)
        );
        assert_eq!(
            TacheStatus::AFaire.transition_to(TacheStatus::Terminee),
            Ok(TacheStatus::Terminee)
        );
    }

    #[test]
    fn test_tache_status_serde_names() {
        assert_eq!(serde_json::to_string(&TacheStatus::AFaire).unwrap(), "\"A_FAIRE\"");
        let parsed: TacheStatus = serde_json::from_str("\"EN_ATTENTE\"").unwrap();
        assert_eq!(parsed, TacheStatus::EnAttente);
    }

    #[test]
    fn test_anomalie_workflow() {
        let assigned = AnomalieStatut::Ouverte.assign().unwrap();
        assert_eq!(assigned, AnomalieStatut::Assignee);
        assert_eq!(assigned.assign(), Ok(AnomalieStatut::Assignee));
        assert_eq!(assigned.close(), Ok(AnomalieStatut::Fermee));
    }

    #[test]
    fn test_anomalie_cannot_skip_or_leave_fermee() {
        assert!(AnomalieStatut::Ouverte.close().is_err());
        assert!(AnomalieStatut::Fermee.assign().is_err());
        assert!(AnomalieStatut::Fermee.close().is_err());
    }

    #[test]
    fn test_role_and_specialite_parse() {
        assert_eq!(RoleMembre::from_str("chef_equipe"), Some(RoleMembre::ChefEquipe));
        assert_eq!(Specialite::from_str("MACONNERIE"), Some(Specialite::Maconnerie));
        assert_eq!(Severite::from_str("critique"), Some(Severite::Critique));
        assert_eq!(RoleMembre::default(), RoleMembre::Ouvrier);
    }
}
