//! Instructors, class times, group classes, enrollments and workouts.
//!
//! The services only touch these through the store (seeding, delete guards),
//! so they are described by schema alone.

use crate::core::format::format_currency;
use crate::core::{DisplayFormat, EntitySchema, FieldKind, FieldSpec, RecordSnapshot};

fn instructor_summary(snapshot: &RecordSnapshot) -> String {
    full_name(snapshot)
}

fn class_time_summary(snapshot: &RecordSnapshot) -> String {
    snapshot.value("start_time").to_string()
}

fn group_class_summary(snapshot: &RecordSnapshot) -> String {
    let price = snapshot.value("price").as_f64().unwrap_or_default();
    format!(
        "{} ({}) {}",
        snapshot.value("description"),
        snapshot.value("dow"),
        format_currency(price)
    )
}

fn enrollment_summary(snapshot: &RecordSnapshot) -> String {
    format!(
        "Client {} in class {}",
        snapshot.value("client_id"),
        snapshot.value("group_class_id")
    )
}

fn workout_summary(snapshot: &RecordSnapshot) -> String {
    format!(
        "Workout for client {} at {}",
        snapshot.value("client_id"),
        snapshot.value("start_time")
    )
}

fn workout_exercise_summary(snapshot: &RecordSnapshot) -> String {
    format!(
        "Exercise {} in workout {}",
        snapshot.value("exercise_id"),
        snapshot.value("workout_id")
    )
}

/// "First M. Last", the way people are listed across the back office.
pub fn full_name(snapshot: &RecordSnapshot) -> String {
    let first = snapshot.value("first_name").to_string();
    let last = snapshot.value("last_name").to_string();
    match snapshot.value("middle_name").as_str().and_then(|m| m.chars().next()) {
        Some(initial) => format!("{first} {}. {last}", initial.to_uppercase()),
        None => format!("{first} {last}"),
    }
}

pub static INSTRUCTORS: EntitySchema = EntitySchema {
    table: "Instructors",
    entity: "Instructor",
    fields: &[
        FieldSpec::new("first_name", FieldKind::Text),
        FieldSpec::new("middle_name", FieldKind::Text).nullable(),
        FieldSpec::new("last_name", FieldKind::Text),
        FieldSpec::new("phone", FieldKind::Text).display(DisplayFormat::Phone),
        FieldSpec::new("email", FieldKind::Text),
    ],
    summary: instructor_summary,
};

pub static CLASS_TIMES: EntitySchema = EntitySchema {
    table: "ClassTimes",
    entity: "Class Time",
    fields: &[FieldSpec::new("start_time", FieldKind::Text)],
    summary: class_time_summary,
};

pub static GROUP_CLASSES: EntitySchema = EntitySchema {
    table: "GroupClasses",
    entity: "Group Class",
    fields: &[
        FieldSpec::new("description", FieldKind::Text),
        FieldSpec::new("price", FieldKind::Float).display(DisplayFormat::Currency),
        FieldSpec::new("dow", FieldKind::Text),
        FieldSpec::new("fitness_category_id", FieldKind::Reference("FitnessCategories")),
        FieldSpec::new("instructor_id", FieldKind::Reference("Instructors")),
        FieldSpec::new("class_time_id", FieldKind::Reference("ClassTimes")),
    ],
    summary: group_class_summary,
};

pub static ENROLLMENTS: EntitySchema = EntitySchema {
    table: "Enrollments",
    entity: "Enrollment",
    fields: &[
        FieldSpec::new("client_id", FieldKind::Reference("Clients")).immutable(),
        FieldSpec::new("group_class_id", FieldKind::Reference("GroupClasses")).immutable(),
    ],
    summary: enrollment_summary,
};

pub static WORKOUTS: EntitySchema = EntitySchema {
    table: "Workouts",
    entity: "Workout",
    fields: &[
        FieldSpec::new("client_id", FieldKind::Reference("Clients")),
        FieldSpec::new("instructor_id", FieldKind::Reference("Instructors")).nullable(),
        FieldSpec::new("start_time", FieldKind::Text),
        FieldSpec::new("end_time", FieldKind::Text).nullable(),
        FieldSpec::new("notes", FieldKind::Text).nullable(),
    ],
    summary: workout_summary,
};

pub static WORKOUT_EXERCISES: EntitySchema = EntitySchema {
    table: "WorkoutExercises",
    entity: "Workout Exercise",
    fields: &[
        FieldSpec::new("workout_id", FieldKind::Reference("Workouts")).immutable(),
        FieldSpec::new("exercise_id", FieldKind::Reference("Exercises")).immutable(),
    ],
    summary: workout_exercise_summary,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_name_uses_middle_initial_when_present() {
        let with_middle = RecordSnapshot::new()
            .with("first_name", "Fred")
            .with("middle_name", "bart")
            .with("last_name", "Flintstone");
        assert_eq!(full_name(&with_middle), "Fred B. Flintstone");

        let without = RecordSnapshot::new()
            .with("first_name", "Wilma")
            .with("last_name", "Flintstone");
        assert_eq!(full_name(&without), "Wilma Flintstone");
    }
}
