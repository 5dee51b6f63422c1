use super::notify::{EmailAddress, EmailMessage, EmailSender};
use super::report::{self, MembershipTypeSummary};
use super::{DEFAULT_PAGE_SIZE, Page, PageRequest, load_all, load_record};
use crate::audit::{ActorContext, Clock, Role, SystemClock};
use crate::core::{FieldValue, GymError, GymResult, RecordId, RecordSnapshot, ValidationErrors};
use crate::domain::{CLIENTS, Client, MembershipType};
use crate::reconcile::{ConflictReconciler, EditRequest};
use crate::record::{VersionToken, VersionedRecord};
use crate::spreadsheet::Worksheet;
use crate::store::{DeleteOutcome, InsertOutcome, Store};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Fields a client edit may change. Anything else submitted is ignored.
pub const CLIENT_EDITABLE_FIELDS: &[&str] = &[
    "membership_number",
    "first_name",
    "middle_name",
    "last_name",
    "phone",
    "email",
    "dob",
    "postal_code",
    "health_condition",
    "notes",
    "membership_start_date",
    "membership_end_date",
    "membership_fee",
    "fee_paid",
    "membership_type_id",
];

const ALL_ROLES: &[Role] = &[Role::Admin, Role::Supervisor, Role::Staff, Role::Client];
const STAFF_ROLES: &[Role] = &[Role::Admin, Role::Supervisor, Role::Staff];
const MANAGER_ROLES: &[Role] = &[Role::Admin, Role::Supervisor];

lazy_static! {
    static ref EMAIL: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref POSTAL_CODE: Regex = Regex::new(r"(?i)^[A-Z]\d[A-Z] ?\d[A-Z]\d$").unwrap();
}

/// A submitted client form. Every field is optional so that missing values
/// can be reported together instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientForm {
    pub membership_number: Option<i64>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub dob: Option<NaiveDate>,
    pub postal_code: Option<String>,
    pub health_condition: Option<String>,
    pub notes: Option<String>,
    pub membership_start_date: Option<NaiveDate>,
    pub membership_end_date: Option<NaiveDate>,
    pub membership_fee: Option<f64>,
    pub fee_paid: Option<bool>,
    pub membership_type_id: Option<RecordId>,
}

fn required_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: &Option<String>,
    max: usize,
    blank: &str,
) -> Option<String> {
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    if value.is_empty() {
        errors.push(Some(field), blank);
        return None;
    }
    if value.chars().count() > max {
        errors.push(Some(field), format!("Cannot be more than {max} characters long."));
        return None;
    }
    Some(value.to_string())
}

fn optional_text(errors: &mut ValidationErrors, field: &str, value: &Option<String>, max: usize) -> Option<String> {
    let value = value.as_deref().map(str::trim).filter(|v| !v.is_empty())?;
    if value.chars().count() > max {
        errors.push(Some(field), format!("Cannot be more than {max} characters long."));
        return None;
    }
    Some(value.to_string())
}

impl ClientForm {
    /// Checks every field and returns the normalized row body. `today` bounds
    /// the date of birth.
    pub fn validate(&self, today: NaiveDate) -> GymResult<RecordSnapshot> {
        let mut errors = ValidationErrors::new();

        let membership_number = match self.membership_number {
            None => {
                errors.push(Some("membership_number"), "You must enter a Membership Number.");
                None
            }
            Some(n) if !(10000..=99999).contains(&n) => {
                errors.push(Some("membership_number"), "The Membership Number must be exactly 5 digits.");
                None
            }
            Some(n) => Some(n),
        };

        let first_name = required_text(&mut errors, "first_name", &self.first_name, 50, "You cannot leave the first name blank.");
        let middle_name = optional_text(&mut errors, "middle_name", &self.middle_name, 50);
        let last_name = required_text(&mut errors, "last_name", &self.last_name, 100, "You cannot leave the last name blank.");

        let phone = match self.phone.as_deref() {
            None => {
                errors.push(Some("phone"), "Phone number is required.");
                None
            }
            Some(raw) => {
                let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
                let only_punctuation = raw
                    .chars()
                    .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.'));
                if digits.len() != 10 || !only_punctuation {
                    errors.push(Some("phone"), "Enter a valid 10-digit phone number (no spaces).");
                    None
                } else {
                    Some(digits)
                }
            }
        };

        let email = required_text(&mut errors, "email", &self.email, 255, "Email Address is required.");
        let email = match email {
            Some(email) if !EMAIL.is_match(&email) => {
                errors.push(Some("email"), "Please follow the correct email format test@email.com");
                None
            }
            other => other,
        };

        let dob = match self.dob {
            None => {
                errors.push(Some("dob"), "Date of Birth is required.");
                None
            }
            Some(dob) if dob >= today => {
                errors.push(Some("dob"), "Date of Birth must be in the past.");
                None
            }
            Some(dob) => Some(dob),
        };

        let postal_code = required_text(&mut errors, "postal_code", &self.postal_code, 7, "Postal Code is required.");
        let postal_code = match postal_code {
            Some(code) if !POSTAL_CODE.is_match(&code) => {
                errors.push(Some("postal_code"), "Please enter a valid Canadian postal code.");
                None
            }
            Some(code) => Some(code.to_uppercase()),
            None => None,
        };

        let health_condition = required_text(
            &mut errors,
            "health_condition",
            &self.health_condition,
            255,
            "Health Condition is required. Enter None if there is nothing to report.",
        );
        let notes = optional_text(&mut errors, "notes", &self.notes, 2000);

        if self.membership_start_date.is_none() {
            errors.push(Some("membership_start_date"), "Membership Start Date is required.");
        }
        if self.membership_end_date.is_none() {
            errors.push(Some("membership_end_date"), "Membership End Date is required.");
        }
        if let (Some(start), Some(end)) = (self.membership_start_date, self.membership_end_date)
            && end < start
        {
            errors.push(
                Some("membership_end_date"),
                "Membership End Date cannot be before the Start Date.",
            );
        }

        match self.membership_fee {
            None => errors.push(Some("membership_fee"), "Membership Fee is required."),
            Some(fee) if !fee.is_finite() || fee < 0.0 => {
                errors.push(Some("membership_fee"), "Membership Fee cannot be negative.")
            }
            Some(_) => {}
        }

        if self.membership_type_id.is_none() {
            errors.push(Some("membership_type_id"), "You must select a Membership Type.");
        }

        errors.into_result()?;

        let mut snapshot = RecordSnapshot::new()
            .with("middle_name", middle_name)
            .with("notes", notes)
            .with("fee_paid", self.fee_paid.unwrap_or(false));
        if let Some(v) = membership_number {
            snapshot.set("membership_number", v);
        }
        for (field, value) in [
            ("first_name", first_name),
            ("last_name", last_name),
            ("phone", phone),
            ("email", email),
            ("postal_code", postal_code),
            ("health_condition", health_condition),
        ] {
            if let Some(value) = value {
                snapshot.set(field, value);
            }
        }
        for (field, value) in [
            ("dob", dob),
            ("membership_start_date", self.membership_start_date),
            ("membership_end_date", self.membership_end_date),
        ] {
            if let Some(value) = value {
                snapshot.set(field, value);
            }
        }
        if let Some(fee) = self.membership_fee {
            snapshot.set("membership_fee", fee);
        }
        if let Some(type_id) = self.membership_type_id {
            snapshot.set("membership_type_id", FieldValue::Reference(type_id));
        }
        Ok(snapshot)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EmailRequest {
    pub selected: Vec<RecordId>,
    pub subject: String,
    pub content: String,
}

/// Unique and reference violations on a client, phrased for the form.
fn client_constraint_error(err: GymError) -> GymError {
    let GymError::ConstraintViolation { constraint, field, message } = err else {
        return err;
    };
    let (field, message) = match constraint.as_str() {
        "Clients.MembershipNumber" => (
            Some("membership_number".to_string()),
            "Unable to save changes. Remember, you cannot have duplicate Membership Numbers.".to_string(),
        ),
        "Clients.Email" => (
            Some("email".to_string()),
            "This email address has already been registered by a client.".to_string(),
        ),
        "Clients.membership_type_id" => (
            Some("membership_type_id".to_string()),
            "The selected Membership Type no longer exists.".to_string(),
        ),
        _ => (field, message),
    };
    GymError::ConstraintViolation { constraint, field, message }
}

pub struct ClientService {
    store: Arc<dyn Store>,
    reconciler: ConflictReconciler,
    mailer: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
    default_page_size: usize,
}

impl ClientService {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn EmailSender>) -> Self {
        Self {
            reconciler: ConflictReconciler::new(store.clone()),
            store,
            mailer,
            clock: Arc::new(SystemClock),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_default_page_size(mut self, size: usize) -> Self {
        self.default_page_size = size;
        self
    }

    /// Clients ordered by first, middle and last name. A `Client`-role actor
    /// only ever sees the record carrying their own e-mail.
    pub async fn index(&self, actor: &ActorContext, page: PageRequest) -> GymResult<Page<Client>> {
        actor.require_any_role(ALL_ROLES)?;

        let mut clients: Vec<Client> = load_all(self.store.as_ref()).await?;
        if actor.is_in_role(Role::Client) {
            let own = actor.email();
            clients.retain(|client| Some(client.email.as_str()) == own);
        }
        clients.sort_by(|a, b| {
            (&a.first_name, &a.middle_name, &a.last_name).cmp(&(&b.first_name, &b.middle_name, &b.last_name))
        });

        Ok(Page::paginate(clients, page, self.default_page_size))
    }

    pub async fn details(&self, actor: &ActorContext, id: RecordId) -> GymResult<Client> {
        actor.require_any_role(ALL_ROLES)?;
        load_record(self.store.as_ref(), id).await
    }

    pub async fn create(&self, actor: &ActorContext, form: ClientForm) -> GymResult<Client> {
        actor.require_any_role(STAFF_ROLES)?;
        let snapshot = form.validate(self.today())?;

        match self.store.insert(actor, CLIENTS.table, snapshot).await? {
            InsertOutcome::Inserted(row) => {
                info!(id = row.id, actor = actor.name(), "client created");
                Client::from_row(&row)
            }
            InsertOutcome::ConstraintViolation(violation) => Err(client_constraint_error(
                crate::reconcile::constraint_error(&violation),
            )),
        }
    }

    /// Saves the form against `starting_token`. A stale token fails with a
    /// [`GymError::VersionConflict`] carrying the field-by-field report.
    pub async fn edit(
        &self,
        actor: &ActorContext,
        id: RecordId,
        form: ClientForm,
        starting_token: VersionToken,
    ) -> GymResult<Client> {
        actor.require_any_role(ALL_ROLES)?;
        let existing: Client = load_record(self.store.as_ref(), id).await?;
        if actor.is_in_role(Role::Client) && actor.email() != Some(existing.email.as_str()) {
            return Err(GymError::forbidden("Clients may only edit their own record."));
        }

        let submitted = form.validate(self.today())?;
        let outcome = self
            .reconciler
            .reconcile(
                actor,
                EditRequest {
                    schema: &CLIENTS,
                    id,
                    submitted,
                    starting_token,
                    allowed: CLIENT_EDITABLE_FIELDS,
                },
            )
            .await
            .map_err(client_constraint_error)?;

        outcome.into_result(&CLIENTS, id)?;
        load_record(self.store.as_ref(), id).await
    }

    /// Admins delete any client; a Supervisor only the ones they entered.
    pub async fn delete(&self, actor: &ActorContext, id: RecordId) -> GymResult<()> {
        actor.require_any_role(MANAGER_ROLES)?;
        let client: Client = load_record(self.store.as_ref(), id).await?;

        if !actor.is_in_role(Role::Admin) && client.created_by() != Some(actor.name()) {
            return Err(GymError::forbidden(format!(
                "As a Supervisor, you cannot delete Client: {}, because you did not enter it into the system.",
                client.summary()
            )));
        }

        match self.store.delete(actor, CLIENTS.table, id).await? {
            DeleteOutcome::Deleted => {
                info!(id, actor = actor.name(), "client deleted");
                Ok(())
            }
            DeleteOutcome::RestrictedBy(relationship) => Err(GymError::RestrictedDelete {
                relationship,
                message: "Unable to Delete Client. Remember, you cannot delete a Client that is enrolled in any Group Classes.".to_string(),
            }),
            DeleteOutcome::NotFound => Err(GymError::not_found(CLIENTS.entity, id)),
        }
    }

    /// Sends one message to every selected client that has an e-mail address
    /// and returns how many were addressed.
    pub async fn email(&self, actor: &ActorContext, request: EmailRequest) -> GymResult<usize> {
        actor.require_any_role(MANAGER_ROLES)?;

        if request.subject.trim().is_empty() || request.content.trim().is_empty() {
            return Err(GymError::validation(
                None,
                "You must enter both a Subject and some message Content before sending the message.",
            ));
        }
        if request.selected.is_empty() {
            return Err(GymError::validation(None, "No Clients selected."));
        }

        let selected: BTreeSet<RecordId> = request.selected.iter().copied().collect();
        let clients: Vec<Client> = load_all(self.store.as_ref()).await?;
        let recipients: Vec<EmailAddress> = clients
            .iter()
            .filter(|c| selected.contains(&c.id) && !c.email.trim().is_empty())
            .map(|c| EmailAddress {
                name: c.summary(),
                address: c.email.clone(),
            })
            .collect();

        let count = recipients.len();
        if count == 0 {
            return Err(GymError::validation(None, "Message NOT sent!"));
        }

        let message = EmailMessage::new(
            recipients,
            request.subject.trim(),
            format!(
                "<p>{}</p><p>Please access the <strong>Gym</strong> web site to review.</p>",
                request.content.trim()
            ),
        );
        if let Err(err) = self.mailer.send_to_many(&message).await {
            warn!(message_id = %message.id, recipients = count, error = %err, "client email failed");
            return Err(GymError::NotificationDispatchFailure { recipients: count });
        }

        info!(message_id = %message.id, recipients = count, actor = actor.name(), "client email sent");
        Ok(count)
    }

    pub async fn membership_type_summary(
        &self,
        actor: &ActorContext,
        page: PageRequest,
    ) -> GymResult<Page<MembershipTypeSummary>> {
        actor.require_any_role(&[Role::Admin])?;
        let rows = self.summary_rows().await?;
        Ok(Page::paginate(rows, page, self.default_page_size))
    }

    pub async fn membership_type_report(&self, actor: &ActorContext) -> GymResult<Worksheet> {
        actor.require_any_role(&[Role::Admin])?;
        let rows = self.summary_rows().await?;
        if rows.is_empty() {
            return Err(GymError::not_found(report::REPORT_TITLE, "No data."));
        }
        Ok(report::build_worksheet(&rows, self.clock.now()))
    }

    async fn summary_rows(&self) -> GymResult<Vec<MembershipTypeSummary>> {
        let clients: Vec<Client> = load_all(self.store.as_ref()).await?;
        let types: Vec<MembershipType> = load_all(self.store.as_ref()).await?;
        Ok(report::summarize(&clients, &types))
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn valid_form() -> ClientForm {
        ClientForm {
            membership_number: Some(10042),
            first_name: Some(" Fred ".to_string()),
            middle_name: Some(String::new()),
            last_name: Some("Flintstone".to_string()),
            phone: Some("905-555-0101".to_string()),
            email: Some("fred@bedrock.ca".to_string()),
            dob: NaiveDate::from_ymd_opt(1980, 2, 3),
            postal_code: Some("l2s 3a1".to_string()),
            health_condition: Some("None".to_string()),
            notes: None,
            membership_start_date: NaiveDate::from_ymd_opt(2025, 1, 1),
            membership_end_date: NaiveDate::from_ymd_opt(2025, 12, 31),
            membership_fee: Some(450.0),
            fee_paid: None,
            membership_type_id: Some(1),
        }
    }

    #[test]
    fn valid_form_is_normalized() {
        let snapshot = valid_form().validate(today()).unwrap();
        assert_eq!(snapshot.value("first_name"), &FieldValue::from("Fred"));
        assert_eq!(snapshot.value("middle_name"), &FieldValue::Null);
        assert_eq!(snapshot.value("phone"), &FieldValue::from("9055550101"));
        assert_eq!(snapshot.value("postal_code"), &FieldValue::from("L2S 3A1"));
        assert_eq!(snapshot.value("fee_paid"), &FieldValue::Boolean(false));
        assert_eq!(snapshot.value("membership_type_id"), &FieldValue::Reference(1));
        assert!(CLIENTS.validate_complete(&snapshot).is_ok());
    }

    #[test]
    fn every_problem_is_reported_per_field() {
        let form = ClientForm {
            membership_number: Some(12),
            email: Some("not-an-email".to_string()),
            membership_end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..valid_form()
        };
        let Err(GymError::Validation(errors)) = form.validate(today()) else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.for_field("membership_number").count(), 1);
        assert_eq!(errors.for_field("email").count(), 1);
        assert_eq!(errors.for_field("membership_end_date").count(), 1);
        assert_eq!(errors.errors().len(), 3);
    }

    #[test]
    fn empty_form_lists_required_fields() {
        let Err(GymError::Validation(errors)) = ClientForm::default().validate(today()) else {
            panic!("expected validation errors");
        };
        for field in ["membership_number", "first_name", "phone", "email", "dob", "membership_type_id"] {
            assert_eq!(errors.for_field(field).count(), 1, "{field}");
        }
    }

    #[test]
    fn future_birth_date_is_rejected() {
        let form = ClientForm {
            dob: NaiveDate::from_ymd_opt(2030, 1, 1),
            ..valid_form()
        };
        assert!(form.validate(today()).is_err());
    }

    #[test]
    fn duplicate_email_is_phrased_for_the_form() {
        let err = client_constraint_error(GymError::ConstraintViolation {
            constraint: "Clients.Email".to_string(),
            field: Some("email".to_string()),
            message: "UNIQUE constraint failed: Clients.Email".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "This email address has already been registered by a client."
        );
    }
}
