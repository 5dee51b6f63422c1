//! Sample data for a fresh store.

use crate::audit::ActorContext;
use crate::core::{FieldValue, GymError, GymResult, RecordId, RecordSnapshot};
use crate::domain::{
    CLASS_TIMES, CLIENTS, ENROLLMENTS, EXERCISE_CATEGORIES, EXERCISES, ExerciseCategory,
    FITNESS_CATEGORIES, GROUP_CLASSES, INSTRUCTORS, MEMBERSHIP_TYPES,
};
use crate::reconcile::constraint_error;
use crate::store::{InsertOutcome, Store};
use chrono::NaiveDate;
use tracing::info;

const MEMBERSHIP_TYPES_SEED: &[(&str, f64)] = &[
    ("Basic", 350.00),
    ("Standard", 500.00),
    ("Premium", 750.00),
    ("Student", 250.00),
];

const CATEGORIES_SEED: &[&str] = &["Cardio", "Core", "Flexibility", "Strength", "Yoga"];

const INSTRUCTORS_SEED: &[(&str, Option<&str>, &str, &str, &str)] = &[
    ("Tina", Some("Marie"), "Kowalski", "9055550111", "tkowalski@gymdesk.ca"),
    ("Raj", None, "Patel", "9055550112", "rpatel@gymdesk.ca"),
    ("Ana", Some("Luisa"), "Ferreira", "9055550113", "aferreira@gymdesk.ca"),
];

const CLASS_TIMES_SEED: &[&str] = &["6:00 AM", "9:00 AM", "12:00 PM", "5:30 PM", "7:00 PM"];

/// (description, price, day, category index, instructor index, time index)
const GROUP_CLASSES_SEED: &[(&str, f64, &str, usize, usize, usize)] = &[
    ("Morning Spin", 15.00, "Monday", 0, 0, 0),
    ("Core Blast", 12.50, "Tuesday", 1, 1, 3),
    ("Power Yoga", 18.00, "Wednesday", 4, 2, 2),
    ("Strength Circuit", 20.00, "Thursday", 3, 1, 4),
];

const EXERCISES_SEED: &[(&str, &[usize])] = &[
    ("Burpees", &[0, 3]),
    ("Plank", &[1]),
    ("Downward Dog", &[2, 4]),
    ("Deadlift", &[3]),
    ("Jump Rope", &[0]),
];

struct ClientSeed {
    number: i64,
    first: &'static str,
    middle: Option<&'static str>,
    last: &'static str,
    email: &'static str,
    membership: usize,
    fee: f64,
    paid: bool,
}

const CLIENTS_SEED: &[ClientSeed] = &[
    ClientSeed { number: 10001, first: "Fred", middle: None, last: "Flintstone", email: "fflintstone@outlook.com", membership: 0, fee: 350.00, paid: true },
    ClientSeed { number: 10002, first: "Wilma", middle: Some("Jane"), last: "Flintstone", email: "wflintstone@outlook.com", membership: 2, fee: 750.00, paid: true },
    ClientSeed { number: 10003, first: "Barney", middle: None, last: "Rubble", email: "brubble@outlook.com", membership: 1, fee: 500.00, paid: false },
    ClientSeed { number: 10004, first: "Betty", middle: Some("Ann"), last: "Rubble", email: "betty.rubble@outlook.com", membership: 2, fee: 700.00, paid: true },
    ClientSeed { number: 10005, first: "Pebbles", middle: None, last: "Flintstone", email: "pebbles@outlook.com", membership: 3, fee: 250.00, paid: true },
];

/// (client index, group class index)
const ENROLLMENTS_SEED: &[(usize, usize)] = &[(0, 0), (0, 1), (1, 2), (3, 2), (4, 3)];

/// Rows created by [`seed_sample_data`], per table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub tables: Vec<(&'static str, usize)>,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn rows(&self) -> usize {
        self.tables.iter().map(|(_, count)| count).sum()
    }
}

async fn insert(store: &dyn Store, actor: &ActorContext, table: &str, fields: RecordSnapshot) -> GymResult<RecordId> {
    match store.insert(actor, table, fields).await? {
        InsertOutcome::Inserted(row) => Ok(row.id),
        InsertOutcome::ConstraintViolation(violation) => Err(constraint_error(&violation)),
    }
}

fn date(year: i32, month: u32, day: u32) -> GymResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| GymError::Schema(format!("invalid seed date {year}-{month}-{day}")))
}

/// Fills an empty store under the system actor. A store that already holds
/// membership types is left alone and an empty report is returned.
///
/// ```
/// # tokio_test::block_on(async {
/// use gymdesk::seed::seed_sample_data;
/// use gymdesk::{MemoryStore, gym_catalog};
///
/// let store = MemoryStore::new(gym_catalog().unwrap());
/// let first = seed_sample_data(&store).await.unwrap();
/// assert!(!first.is_empty());
///
/// let again = seed_sample_data(&store).await.unwrap();
/// assert!(again.is_empty());
/// # });
/// ```
pub async fn seed_sample_data(store: &dyn Store) -> GymResult<SeedReport> {
    let actor = ActorContext::system();
    let mut report = SeedReport::default();

    if !store.scan(MEMBERSHIP_TYPES.table).await?.is_empty() {
        info!("store already has data; skipping seed");
        return Ok(report);
    }

    let mut memberships = Vec::new();
    for (name, fee) in MEMBERSHIP_TYPES_SEED {
        let fields = RecordSnapshot::new().with("type", *name).with("standard_fee", *fee);
        memberships.push(insert(store, &actor, MEMBERSHIP_TYPES.table, fields).await?);
    }
    report.tables.push((MEMBERSHIP_TYPES.table, memberships.len()));

    let mut categories = Vec::new();
    for name in CATEGORIES_SEED {
        let fields = RecordSnapshot::new().with("category", *name);
        categories.push(insert(store, &actor, FITNESS_CATEGORIES.table, fields).await?);
    }
    report.tables.push((FITNESS_CATEGORIES.table, categories.len()));

    let mut instructors = Vec::new();
    for (first, middle, last, phone, email) in INSTRUCTORS_SEED {
        let fields = RecordSnapshot::new()
            .with("first_name", *first)
            .with("middle_name", *middle)
            .with("last_name", *last)
            .with("phone", *phone)
            .with("email", *email);
        instructors.push(insert(store, &actor, INSTRUCTORS.table, fields).await?);
    }
    report.tables.push((INSTRUCTORS.table, instructors.len()));

    let mut times = Vec::new();
    for start in CLASS_TIMES_SEED {
        let fields = RecordSnapshot::new().with("start_time", *start);
        times.push(insert(store, &actor, CLASS_TIMES.table, fields).await?);
    }
    report.tables.push((CLASS_TIMES.table, times.len()));

    let mut classes = Vec::new();
    for (description, price, dow, category, instructor, time) in GROUP_CLASSES_SEED {
        let fields = RecordSnapshot::new()
            .with("description", *description)
            .with("price", *price)
            .with("dow", *dow)
            .with("fitness_category_id", FieldValue::Reference(categories[*category]))
            .with("instructor_id", FieldValue::Reference(instructors[*instructor]))
            .with("class_time_id", FieldValue::Reference(times[*time]));
        classes.push(insert(store, &actor, GROUP_CLASSES.table, fields).await?);
    }
    report.tables.push((GROUP_CLASSES.table, classes.len()));

    let mut clients = Vec::new();
    for (index, seed) in CLIENTS_SEED.iter().enumerate() {
        let fields = RecordSnapshot::new()
            .with("membership_number", seed.number)
            .with("first_name", seed.first)
            .with("middle_name", seed.middle)
            .with("last_name", seed.last)
            .with("phone", format!("905555020{index}"))
            .with("email", seed.email)
            .with("dob", date(1985 + index as i32, 3, 14)?)
            .with("postal_code", "L2S 3A1")
            .with("health_condition", "None")
            .with("notes", None::<String>)
            .with("membership_start_date", date(2025, 1, 1)?)
            .with("membership_end_date", date(2025, 12, 31)?)
            .with("membership_fee", seed.fee)
            .with("fee_paid", seed.paid)
            .with("membership_type_id", FieldValue::Reference(memberships[seed.membership]));
        clients.push(insert(store, &actor, CLIENTS.table, fields).await?);
    }
    report.tables.push((CLIENTS.table, clients.len()));

    for (client, class) in ENROLLMENTS_SEED {
        let fields = RecordSnapshot::new()
            .with("client_id", FieldValue::Reference(clients[*client]))
            .with("group_class_id", FieldValue::Reference(classes[*class]));
        insert(store, &actor, ENROLLMENTS.table, fields).await?;
    }
    report.tables.push((ENROLLMENTS.table, ENROLLMENTS_SEED.len()));

    let mut links = 0;
    for (name, linked) in EXERCISES_SEED {
        let fields = RecordSnapshot::new().with("name", *name);
        let exercise = insert(store, &actor, EXERCISES.table, fields).await?;
        for category in *linked {
            let link = ExerciseCategory::snapshot(categories[*category], exercise);
            insert(store, &actor, EXERCISE_CATEGORIES.table, link).await?;
            links += 1;
        }
    }
    report.tables.push((EXERCISES.table, EXERCISES_SEED.len()));
    report.tables.push((EXERCISE_CATEGORIES.table, links));

    info!(rows = report.rows(), "sample data seeded");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::gym_catalog;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn seeds_once() {
        let store = MemoryStore::new(gym_catalog().unwrap());

        let first = seed_sample_data(&store).await.unwrap();
        assert_eq!(first.tables[0], ("MembershipTypes", 4));
        assert_eq!(store.row_count("Clients").await.unwrap(), 5);
        assert_eq!(store.row_count("ExerciseCategories").await.unwrap(), 7);

        let clients = store.scan("Clients").await.unwrap();
        let stamp = clients[0].audit.as_ref().unwrap();
        assert_eq!(stamp.created_by, "Seed Data");

        let second = seed_sample_data(&store).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(store.row_count("Clients").await.unwrap(), 5);
    }
}
