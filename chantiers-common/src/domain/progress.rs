//! Derived display fields
//!
//! Pure functions over already-loaded data. Nothing computed here is ever
//! written back to the database; callers pass `today` explicitly.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::status::{AnomalieStatut, ChantierStatus, TacheStatus};

/// Percentage of terminal children, rounded to one decimal place
///
/// Zero children yields `0.0`.
///
/// # Examples
/// ```
/// use chantiers_common::domain::progress::progression;
///
/// assert_eq!(progression(1, 3), 33.3);
/// assert_eq!(progression(2, 3), 66.7);
/// assert_eq!(progression(0, 0), 0.0);
/// ```
pub fn progression(terminal: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = terminal as f64 * 100.0 / total as f64;
    (pct * 10.0).round() / 10.0
}

/// Progression over a set of tâche statuses
pub fn progression_of<I>(statuses: I) -> f64
where
    I: IntoIterator<Item = TacheStatus>,
{
    let (terminal, total) = statuses
        .into_iter()
        .fold((0usize, 0usize), |(terminal, total), status| {
            (terminal + usize::from(status.is_terminal()), total + 1)
        });
    progression(terminal, total)
}

/// Chantier or lot is late: planned end strictly before today and not closed
pub fn chantier_overdue(status: ChantierStatus, date_fin_prevue: NaiveDate, today: NaiveDate) -> bool {
    today > date_fin_prevue && !status.is_closed()
}

/// Tâche is late: still open past its planned end, or finished after it
pub fn tache_overdue(
    status: TacheStatus,
    date_fin_prevue: NaiveDate,
    date_fin_reelle: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    if status.is_terminal() {
        return date_fin_reelle.is_some_and(|fin| fin > date_fin_prevue);
    }
    today > date_fin_prevue
}

/// Anomaly fix is late: still open past its planned resolution date
pub fn anomalie_overdue(
    statut: AnomalieStatut,
    date_resolution_prevue: Option<NaiveDate>,
    today: NaiveDate,
) -> bool {
    match date_resolution_prevue {
        Some(due) => statut.is_open() && today > due,
        None => false,
    }
}

/// Days left until the planned end, never negative
pub fn jours_restants(date_fin_prevue: NaiveDate, today: NaiveDate) -> i64 {
    (date_fin_prevue - today).num_days().max(0)
}

/// One logged hour entry as seen by the cost calculation
#[derive(Debug, Clone, Copy)]
pub struct HourEntry {
    pub heures: Decimal,
    pub validee: bool,
}

/// Hours and cost of one tâche
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TacheTotals {
    /// Every logged hour, validated or not
    pub heures_reelles: Decimal,
    /// Validated hours × hourly rate + material cost
    pub cout_reel: Decimal,
}

/// Totals for one tâche from its hour entries
///
/// Only validated hours are billed; all hours count toward `heures_reelles`.
pub fn tache_totals<'a, I>(entries: I, taux_horaire: Decimal, cout_materiaux: Decimal) -> TacheTotals
where
    I: IntoIterator<Item = &'a HourEntry>,
{
    let mut heures_reelles = Decimal::ZERO;
    let mut heures_validees = Decimal::ZERO;
    for entry in entries {
        heures_reelles += entry.heures;
        if entry.validee {
            heures_validees += entry.heures;
        }
    }

    TacheTotals {
        heures_reelles,
        cout_reel: round_money(heures_validees * taux_horaire + cout_materiaux),
    }
}

/// Round a currency amount to cents
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_progression_no_children_is_zero() {
        assert_eq!(progression(0, 0), 0.0);
        assert_eq!(progression_of(Vec::<TacheStatus>::new()), 0.0);
    }

    #[test]
    fn test_progression_rounds_to_one_decimal() {
        assert_eq!(progression(1, 2), 50.0);
        assert_eq!(progression(1, 3), 33.3);
        assert_eq!(progression(2, 3), 66.7);
        assert_eq!(progression(1, 7), 14.3);
        assert_eq!(progression(4, 4), 100.0);
    }

    #[test]
    fn test_progression_matches_formula_for_many_sizes() {
        for total in 1..=40usize {
            for terminal in 0..=total {
                let expected = (100.0 * terminal as f64 / total as f64 * 10.0).round() / 10.0;
                assert_eq!(progression(terminal, total), expected);
            }
        }
    }

    #[test]
    fn test_progression_of_counts_only_terminee() {
        let statuses = [
            TacheStatus::Terminee,
            TacheStatus::Revisee,
            TacheStatus::EnCours,
            TacheStatus::Terminee,
        ];
        assert_eq!(progression_of(statuses), 50.0);
    }

    #[test]
    fn test_chantier_overdue() {
        let today = ymd(2024, 6, 10);
        assert!(chantier_overdue(ChantierStatus::InProgress, ymd(2024, 6, 9), today));
        assert!(chantier_overdue(ChantierStatus::Pending, ymd(2024, 1, 1), today));
        assert!(chantier_overdue(ChantierStatus::Paused, ymd(2024, 1, 1), today));
    }

    #[test]
    fn test_chantier_due_today_is_not_overdue() {
        let today = ymd(2024, 6, 10);
        assert!(!chantier_overdue(ChantierStatus::InProgress, today, today));
        assert!(!chantier_overdue(ChantierStatus::InProgress, ymd(2024, 7, 1), today));
    }

    #[test]
    fn test_closed_chantier_never_overdue() {
        let today = ymd(2024, 6, 10);
        for status in [ChantierStatus::Done, ChantierStatus::Invoiced, ChantierStatus::Cancelled] {
            assert!(!chantier_overdue(status, ymd(2020, 1, 1), today));
        }
    }

    #[test]
    fn test_tache_overdue() {
        let today = ymd(2024, 6, 10);
        assert!(tache_overdue(TacheStatus::EnCours, ymd(2024, 6, 9), None, today));
        assert!(tache_overdue(TacheStatus::Revisee, ymd(2024, 6, 9), None, today));
        assert!(!tache_overdue(TacheStatus::Terminee, ymd(2024, 6, 9), None, today));
        assert!(!tache_overdue(TacheStatus::AFaire, today, None, today));
    }

    #[test]
    fn test_tache_finished_after_planned_end_is_overdue() {
        let today = ymd(2024, 6, 10);
        let fin = ymd(2024, 5, 31);
        assert!(tache_overdue(TacheStatus::Terminee, fin, Some(ymd(2024, 6, 3)), today));
        assert!(!tache_overdue(TacheStatus::Terminee, fin, Some(fin), today));
        assert!(!tache_overdue(TacheStatus::Terminee, fin, Some(ymd(2024, 5, 20)), today));
        // Planned end still ahead, finished late anyway
        let early = ymd(2024, 6, 1);
        assert!(tache_overdue(TacheStatus::Terminee, ymd(2024, 6, 5), Some(ymd(2024, 6, 8)), early));
    }

    #[test]
    fn test_anomalie_overdue() {
        let today = ymd(2024, 6, 10);
        assert!(anomalie_overdue(AnomalieStatut::Assignee, Some(ymd(2024, 6, 1)), today));
        assert!(!anomalie_overdue(AnomalieStatut::Fermee, Some(ymd(2024, 6, 1)), today));
        assert!(!anomalie_overdue(AnomalieStatut::Ouverte, None, today));
    }

    #[test]
    fn test_jours_restants_floors_at_zero() {
        let today = ymd(2024, 6, 10);
        assert_eq!(jours_restants(ymd(2024, 6, 20), today), 10);
        assert_eq!(jours_restants(today, today), 0);
        assert_eq!(jours_restants(ymd(2024, 5, 1), today), 0);
    }

    #[test]
    fn test_tache_totals_bills_only_validated_hours() {
        let entries = [
            HourEntry { heures: dec("8.5"), validee: true },
            HourEntry { heures: dec("4"), validee: false },
            HourEntry { heures: dec("1.5"), validee: true },
        ];
        let totals = tache_totals(&entries, dec("50.00"), dec("120.00"));
        assert_eq!(totals.heures_reelles, dec("14.0"));
        assert_eq!(totals.cout_reel, dec("620.00"));
    }

    #[test]
    fn test_tache_totals_empty() {
        let entries: [HourEntry; 0] = [];
        let totals = tache_totals(&entries, dec("50"), Decimal::ZERO);
        assert_eq!(totals, TacheTotals::default());
    }
}
