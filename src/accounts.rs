use chrono::NaiveDate;
use diesel::{prelude::*, result::DatabaseErrorKind, PgConnection};
use uuid::Uuid;

use crate::auth::Role;
use crate::models::{NewUser, User};
use crate::schema::users;

/// Fields collected by the registration forms, already validated.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub company_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
}

pub struct Accounts<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> Accounts<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Accounts { conn }
    }

    /// `Ok(None)` when the email is already registered.
    pub fn register(&mut self, account: NewAccount) -> QueryResult<Option<Uuid>> {
        let is_employer = account.role == Role::Employer;
        let new_user = NewUser {
            id: Uuid::new_v4(),
            name: account.name,
            email: account.email,
            password_hash: account.password_hash,
            role: account.role.as_str().to_string(),
            company_name: account.company_name.filter(|_| is_employer),
            date_of_birth: account.date_of_birth.filter(|_| is_employer),
        };

        match diesel::insert_into(users::table)
            .values(&new_user)
            .execute(self.conn)
        {
            Ok(_) => Ok(Some(new_user.id)),
            Err(diesel::result::Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub fn find(&mut self, user_id: Uuid) -> QueryResult<Option<User>> {
        users::table.find(user_id).first(self.conn).optional()
    }

    pub fn find_by_email(&mut self, email: &str) -> QueryResult<Option<User>> {
        users::table
            .filter(users::email.eq(email))
            .first(self.conn)
            .optional()
    }

    /// The persisted role, which is what authorization trusts.
    pub fn stored_role(&mut self, user_id: Uuid) -> QueryResult<Option<String>> {
        users::table
            .find(user_id)
            .select(users::role)
            .first(self.conn)
            .optional()
    }
}
