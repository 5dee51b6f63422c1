//! Gym entities: their schemas, typed views and the store catalog tying them together.

pub mod client;
pub mod fitness;
pub mod membership;
pub mod schedule;

pub use client::{CLIENTS, Client};
pub use fitness::{EXERCISE_CATEGORIES, EXERCISES, Exercise, ExerciseCategory, FITNESS_CATEGORIES, FitnessCategory};
pub use membership::{MEMBERSHIP_TYPES, MembershipType};
pub use schedule::{CLASS_TIMES, ENROLLMENTS, GROUP_CLASSES, INSTRUCTORS, WORKOUT_EXERCISES, WORKOUTS};

use crate::core::{EntitySchema, StoreResult};
use crate::store::{Catalog, DeletePolicy};

/// Every gym table, parents before dependents.
pub fn schemas() -> [&'static EntitySchema; 11] {
    [
        &MEMBERSHIP_TYPES,
        &FITNESS_CATEGORIES,
        &INSTRUCTORS,
        &CLASS_TIMES,
        &EXERCISES,
        &GROUP_CLASSES,
        &CLIENTS,
        &ENROLLMENTS,
        &EXERCISE_CATEGORIES,
        &WORKOUTS,
        &WORKOUT_EXERCISES,
    ]
}

/// Tables, unique indexes and the delete policy of every relationship.
pub fn gym_catalog() -> StoreResult<Catalog> {
    use DeletePolicy::{Cascade, Restrict};

    let mut builder = Catalog::builder();
    for schema in schemas() {
        builder = builder.table(schema, true);
    }

    builder
        .unique("MembershipTypes", "MembershipTypes.Type", &["type"])
        .unique("FitnessCategories", "FitnessCategories.Category", &["category"])
        .unique("Instructors", "Instructors.Email", &["email"])
        .unique("ClassTimes", "ClassTimes.StartTime", &["start_time"])
        .unique(
            "GroupClasses",
            "GroupClasses.InstructorID_DOW_ClassTimeID",
            &["instructor_id", "dow", "class_time_id"],
        )
        .unique("Clients", "Clients.MembershipNumber", &["membership_number"])
        .unique("Clients", "Clients.Email", &["email"])
        .unique(
            "Enrollments",
            "Enrollments.ClientID_GroupClassID",
            &["client_id", "group_class_id"],
        )
        .unique("Exercises", "Exercises.Name", &["name"])
        .unique(
            "ExerciseCategories",
            "ExerciseCategories.FitnessCategoryID_ExerciseID",
            &["fitness_category_id", "exercise_id"],
        )
        .unique(
            "WorkoutExercises",
            "WorkoutExercises.WorkoutID_ExerciseID",
            &["workout_id", "exercise_id"],
        )
        .relationship("FitnessCategories", "GroupClasses", "fitness_category_id", Restrict)
        .relationship("Instructors", "GroupClasses", "instructor_id", Restrict)
        .relationship("ClassTimes", "GroupClasses", "class_time_id", Restrict)
        .relationship("MembershipTypes", "Clients", "membership_type_id", Restrict)
        .relationship("Clients", "Enrollments", "client_id", Restrict)
        .relationship("GroupClasses", "Enrollments", "group_class_id", Cascade)
        .relationship("Clients", "Workouts", "client_id", Cascade)
        .relationship("Instructors", "Workouts", "instructor_id", Restrict)
        .relationship("Workouts", "WorkoutExercises", "workout_id", Cascade)
        .relationship("Exercises", "ExerciseCategories", "exercise_id", Restrict)
        .relationship("Exercises", "WorkoutExercises", "exercise_id", Restrict)
        .relationship("FitnessCategories", "ExerciseCategories", "fitness_category_id", Cascade)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_declares_a_policy_for_every_reference() {
        let catalog = gym_catalog().unwrap();
        assert_eq!(catalog.tables().count(), 11);
        assert_eq!(catalog.relationships().len(), 12);
    }

    #[test]
    fn category_restricts_classes_and_cascades_exercise_links() {
        let catalog = gym_catalog().unwrap();
        let policies: Vec<_> = catalog
            .dependents_of("FitnessCategories")
            .map(|rel| (rel.name, rel.on_delete))
            .collect();
        assert!(policies.contains(&("GroupClasses", DeletePolicy::Restrict)));
        assert!(policies.contains(&("ExerciseCategories", DeletePolicy::Cascade)));
    }
}
