use crate::security::AuthorizationPolicy;

/// Effective policy of a handler.
///
/// | anonymous | handler | group | result  |
/// |-----------|---------|-------|---------|
/// | yes       | any     | any   | public  |
/// | no        | Some(h) | any   | h       |
/// | no        | None    | Some(g) | g     |
/// | no        | None    | None  | public  |
pub fn resolve_policy<'a>(
    group: Option<&'a AuthorizationPolicy>,
    handler: Option<&'a AuthorizationPolicy>,
    allow_anonymous: bool,
) -> Option<&'a AuthorizationPolicy> {
    if allow_anonymous {
        return None;
    }
    handler.or(group)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_table() {
        let g = AuthorizationPolicy::authenticated().with_roles(["group"]);
        let h = AuthorizationPolicy::authenticated().with_roles(["handler"]);

        let cases = [
            (None, None, false, None),
            (Some(&g), None, false, Some(&g)),
            (None, Some(&h), false, Some(&h)),
            (Some(&g), Some(&h), false, Some(&h)),
            (None, None, true, None),
            (Some(&g), None, true, None),
            (None, Some(&h), true, None),
            (Some(&g), Some(&h), true, None),
        ];

        for (group, handler, anonymous, expected) in cases {
            assert_eq!(
                resolve_policy(group, handler, anonymous),
                expected,
                "group={group:?} handler={handler:?} anonymous={anonymous}"
            );
        }
    }
}
