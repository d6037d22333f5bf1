use sea_orm::Set;
use sea_orm::entity::prelude::DateTimeWithTimeZone;

use crate::db::entities::{invalidation_record, password_reset_challenge, role, user};

pub trait TimestampedActiveModel {
    fn set_created_at(&mut self, ts: DateTimeWithTimeZone);
    fn set_updated_at(&mut self, ts: DateTimeWithTimeZone);
}

impl TimestampedActiveModel for user::ActiveModel {
    fn set_created_at(&mut self, ts: DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }

    fn set_updated_at(&mut self, ts: DateTimeWithTimeZone) {
        self.updated_at = Set(ts);
    }
}

impl TimestampedActiveModel for role::ActiveModel {
    fn set_created_at(&mut self, ts: DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }

    fn set_updated_at(&mut self, ts: DateTimeWithTimeZone) {
        self.updated_at = Set(ts);
    }
}

impl TimestampedActiveModel for invalidation_record::ActiveModel {
    fn set_created_at(&mut self, ts: DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }

    fn set_updated_at(&mut self, ts: DateTimeWithTimeZone) {
        self.updated_at = Set(ts);
    }
}

impl TimestampedActiveModel for password_reset_challenge::ActiveModel {
    fn set_created_at(&mut self, ts: DateTimeWithTimeZone) {
        self.created_at = Set(ts);
    }

    fn set_updated_at(&mut self, ts: DateTimeWithTimeZone) {
        self.updated_at = Set(ts);
    }
}
