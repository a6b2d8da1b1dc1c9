//! Name conversions used for default collection, key and relation names.

/// Convert `StudlyCase` or `camelCase` to `snake_case`.
///
/// ```rust
/// use quarry_model::naming::snake;
///
/// assert_eq!(snake("User"), "user");
/// assert_eq!(snake("BlogPost"), "blog_post");
/// assert_eq!(snake("parentComments"), "parent_comments");
/// assert_eq!(snake("HTTPRequest"), "http_request");
/// ```
pub fn snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                None | Some('_') => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) => p.is_uppercase() && next.is_some_and(char::is_lowercase),
            };
            if boundary {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// The default collection of a model: the snake-cased name plus `s`.
pub fn collection_name(model: &str) -> String {
    format!("{}s", snake(model))
}

/// The default foreign key pointing at a model or relation: `snake(name)_id`.
pub fn foreign_key(name: &str) -> String {
    format!("{}_id", snake(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_keeps_existing_snake_case() {
        assert_eq!(snake("user_roles"), "user_roles");
        assert_eq!(snake("Line2Item"), "line2_item");
    }

    #[test]
    fn test_defaults() {
        assert_eq!(collection_name("BlogPost"), "blog_posts");
        assert_eq!(foreign_key("User"), "user_id");
        assert_eq!(foreign_key("author"), "author_id");
    }
}
