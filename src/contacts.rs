use diesel::{prelude::*, PgConnection};
use tracing::warn;
use uuid::Uuid;

use crate::models::NewContact;
use crate::schema::contacts;

pub struct Contacts<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> Contacts<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        Contacts { conn }
    }

    /// `None` when the inquiry could not be stored.
    pub fn submit(&mut self, name: String, email: String, message: String) -> Option<Uuid> {
        let contact = NewContact {
            id: Uuid::new_v4(),
            name,
            email,
            message,
        };

        match diesel::insert_into(contacts::table)
            .values(&contact)
            .execute(self.conn)
        {
            Ok(_) => Some(contact.id),
            Err(err) => {
                warn!(error = %err, "failed to store contact inquiry");
                None
            }
        }
    }
}
