pub mod blog;
pub mod notification;
pub mod post;
pub mod user;
pub mod user_group;

/// Appends the items not already present. Returns true when the list changed.
pub fn add_unique<T: PartialEq>(list: &mut Vec<T>, items: Vec<T>) -> bool {
    let mut modified = false;
    for item in items {
        if !list.contains(&item) {
            list.push(item);
            modified = true;
        }
    }
    modified
}

/// Removes the items that are present. Returns true when the list changed.
pub fn remove_existing<T: PartialEq>(list: &mut Vec<T>, items: &[T]) -> bool {
    let before = list.len();
    list.retain(|x| !items.contains(x));
    before != list.len()
}
