//! Inputs of the derived fields (progression, hours, cost)
//!
//! Loaded for a whole set of chantiers, lots or tâches at once: one query for
//! the tâches in scope, one for their hour entries.

use chantiers_common::domain::{progression_of, tache_totals, HourEntry, TacheStatus, TacheTotals};
use rust_decimal::Decimal;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::collections::HashMap;

use super::{decimal, parse_enum, push_id_list};
use crate::error::ApiResult;

/// Which ids a stats query is scoped by
#[derive(Debug, Clone, Copy)]
pub enum Scope {
    Chantiers,
    Lots,
    Taches,
}

impl Scope {
    fn column(self) -> &'static str {
        match self {
            Scope::Chantiers => "l.chantier_id",
            Scope::Lots => "t.lot_id",
            Scope::Taches => "t.id",
        }
    }
}

/// One tâche with everything its derived fields need
#[derive(Debug, Clone)]
pub struct TacheStat {
    pub id: i64,
    pub lot_id: i64,
    pub chantier_id: i64,
    pub status: TacheStatus,
    pub heures_estimees: Decimal,
    pub taux_horaire: Decimal,
    pub cout_materiaux: Decimal,
    pub hours: Vec<HourEntry>,
}

impl TacheStat {
    pub fn totals(&self) -> TacheTotals {
        tache_totals(&self.hours, self.taux_horaire, self.cout_materiaux)
    }
}

/// Aggregate over a group of tâches
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rollup {
    pub taches_totales: i64,
    pub taches_terminees: i64,
    pub progression: f64,
    pub heures_estimees: Decimal,
    pub heures_reelles: Decimal,
    pub cout_reel: Decimal,
}

/// Roll up a group of tâches; an empty group is all zeros
pub fn rollup<'a, I>(stats: I) -> Rollup
where
    I: IntoIterator<Item = &'a TacheStat>,
{
    let mut rollup = Rollup::default();
    let mut statuses = Vec::new();
    for stat in stats {
        let totals = stat.totals();
        rollup.taches_totales += 1;
        if stat.status.is_terminal() {
            rollup.taches_terminees += 1;
        }
        rollup.heures_estimees += stat.heures_estimees;
        rollup.heures_reelles += totals.heures_reelles;
        rollup.cout_reel += totals.cout_reel;
        statuses.push(stat.status);
    }
    rollup.progression = progression_of(statuses);
    rollup
}

/// Load tâche stats for every id in `ids` under `scope`
pub async fn load(db: &SqlitePool, scope: Scope, ids: &[i64]) -> ApiResult<Vec<TacheStat>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
        "SELECT t.id, t.lot_id, l.chantier_id, t.status, t.heures_estimees, \
         t.taux_horaire, t.cout_materiaux \
         FROM taches t JOIN lots l ON l.id = t.lot_id WHERE ",
    );
    qb.push(scope.column());
    push_id_list(&mut qb, ids);

    let rows = qb.build().fetch_all(db).await?;
    let mut stats = Vec::with_capacity(rows.len());
    for row in &rows {
        stats.push(TacheStat {
            id: row.get("id"),
            lot_id: row.get("lot_id"),
            chantier_id: row.get("chantier_id"),
            status: parse_enum(row, "status", TacheStatus::from_str)?,
            heures_estimees: decimal(row, "heures_estimees")?,
            taux_horaire: decimal(row, "taux_horaire")?,
            cout_materiaux: decimal(row, "cout_materiaux")?,
            hours: Vec::new(),
        });
    }

    if stats.is_empty() {
        return Ok(stats);
    }

    let tache_ids: Vec<i64> = stats.iter().map(|s| s.id).collect();
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT tache_id, heures, validee FROM heures_travail WHERE tache_id");
    push_id_list(&mut qb, &tache_ids);

    let mut hours: HashMap<i64, Vec<HourEntry>> = HashMap::new();
    for row in qb.build().fetch_all(db).await? {
        hours.entry(row.get("tache_id")).or_default().push(HourEntry {
            heures: decimal(&row, "heures")?,
            validee: row.get("validee"),
        });
    }

    for stat in &mut stats {
        if let Some(entries) = hours.remove(&stat.id) {
            stat.hours = entries;
        }
    }

    Ok(stats)
}

/// Group loaded stats by a key (chantier or lot id)
pub fn group_by(stats: &[TacheStat], key: fn(&TacheStat) -> i64) -> HashMap<i64, Vec<&TacheStat>> {
    let mut groups: HashMap<i64, Vec<&TacheStat>> = HashMap::new();
    for stat in stats {
        groups.entry(key(stat)).or_default().push(stat);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat(status: TacheStatus, hours: &[(i64, bool)]) -> TacheStat {
        TacheStat {
            id: 1,
            lot_id: 1,
            chantier_id: 1,
            status,
            heures_estimees: Decimal::from(10),
            taux_horaire: Decimal::from(40),
            cout_materiaux: Decimal::from(100),
            hours: hours
                .iter()
                .map(|(h, validee)| HourEntry {
                    heures: Decimal::from(*h),
                    validee: *validee,
                })
                .collect(),
        }
    }

    #[test]
    fn test_rollup_empty_group() {
        let rollup = rollup(Vec::<&TacheStat>::new());
        assert_eq!(rollup, Rollup::default());
        assert_eq!(rollup.progression, 0.0);
    }

    #[test]
    fn test_rollup_sums_children() {
        let stats = [
            stat(TacheStatus::Terminee, &[(8, true), (2, false)]),
            stat(TacheStatus::EnCours, &[(4, true)]),
            stat(TacheStatus::AFaire, &[]),
        ];
        let rollup = rollup(&stats);

        assert_eq!(rollup.taches_totales, 3);
        assert_eq!(rollup.taches_terminees, 1);
        assert_eq!(rollup.progression, 33.3);
        assert_eq!(rollup.heures_estimees, Decimal::from(30));
        assert_eq!(rollup.heures_reelles, Decimal::from(14));
        // (8 × 40 + 100) + (4 × 40 + 100) + 100
        assert_eq!(rollup.cout_reel, Decimal::from(780));
    }
}
