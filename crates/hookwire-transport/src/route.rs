//! Request path → `(controller, action)` mapping.

/// Split `/Controller/action` into its two parts.
///
/// Missing segments fall back to the given defaults, and segments past the
/// second are ignored.
///
/// ```
/// use hookwire_transport::split_path;
///
/// assert_eq!(split_path("/User/profile", "Index", "index"), ("User", "profile"));
/// assert_eq!(split_path("/User", "Index", "index"), ("User", "index"));
/// assert_eq!(split_path("/", "Index", "index"), ("Index", "index"));
/// ```
pub fn split_path<'a>(
    path: &'a str,
    default_controller: &'a str,
    default_action: &'a str,
) -> (&'a str, &'a str) {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    let controller = segments.next().unwrap_or(default_controller);
    let action = segments.next().unwrap_or(default_action);
    (controller, action)
}
