use crate::auth::Auth;
use crate::entities::notification::Notification;
use crate::entities::user::User;

pub trait AccessRules<Subject, Object> {
    fn get_access(subject: Subject, object: Object) -> bool;
}

pub struct Read;
pub struct Edit;

/// A notification is visible to its recipient within the same organisation,
/// and to services and admins of that organisation.
impl AccessRules<&Auth, &Notification> for Read {
    fn get_access(auth: &Auth, notification: &Notification) -> bool {
        match auth {
            Auth::Service(_) => true,
            Auth::Admin {
                organisation, ..
            } => organisation == &notification.organisation,
            Auth::User {
                email,
                organisation,
            } => {
                email == &notification.recipient
                    && organisation == &notification.organisation
            }
            Auth::None => false,
        }
    }
}

impl AccessRules<&Auth, &Notification> for Edit {
    fn get_access(auth: &Auth, notification: &Notification) -> bool {
        Read::get_access(auth, notification)
    }
}

impl AccessRules<&Auth, &User> for Edit {
    fn get_access(auth: &Auth, user: &User) -> bool {
        match auth {
            Auth::Service(_) => true,
            Auth::Admin {
                organisation, ..
            } => organisation == &user.organisation,
            Auth::User {
                email,
                organisation,
            } => email == &user.email && organisation == &user.organisation,
            Auth::None => false,
        }
    }
}
