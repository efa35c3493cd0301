use crate::factory::MutatorFactory;
use crate::mutation::{
    MULTIPLE, Mutation, MutationError, MutationKind, TEXT_DELETE, TEXT_INSERT, TEXT_REPLACE,
    TEXT_SWAP,
};
use crate::ordering::order_last_to_first;
use regex::{Captures, Regex};

/// A `Mutator` applies one type of [`Mutation`] to the contents of a file.
///
/// Mutators are resolved by the mutation's `type` tag through a
/// [`MutatorFactory`] and must be pure with respect to their inputs: the same
/// contents and mutation always produce the same output.
///
/// The factory is handed back on every call so that composite mutators can
/// dispatch their child mutations through it.
pub trait Mutator: Send + Sync {
    /// Applies `mutation` to `file_contents`, returning the new contents.
    ///
    /// # Returns
    /// `Err(MutationError)` only when the mutation payload is unusable, such as
    /// an invalid search pattern or a mutation of a kind this mutator does not
    /// handle.
    fn mutate(
        &self,
        file_contents: &str,
        mutation: &Mutation,
        factory: &MutatorFactory,
    ) -> Result<String, MutationError>;
}

/// Converts a character offset into a byte index, clamping past-the-end
/// offsets to the content length.
fn byte_index(contents: &str, char_offset: usize) -> usize {
    contents
        .char_indices()
        .nth(char_offset)
        .map_or(contents.len(), |(index, _)| index)
}

/// Replaces the characters in `[begin, end)` with `insertion`.
fn splice(contents: &str, begin: usize, end: usize, insertion: &str) -> String {
    let start = byte_index(contents, begin);
    let stop = byte_index(contents, end).max(start);

    let mut spliced = String::with_capacity(contents.len() - (stop - start) + insertion.len());
    spliced.push_str(&contents[..start]);
    spliced.push_str(insertion);
    spliced.push_str(&contents[stop..]);
    spliced
}

fn unexpected(expected: &'static str, mutation: &Mutation) -> MutationError {
    MutationError::UnexpectedKind {
        expected,
        actual: mutation.type_name().to_string(),
    }
}

/// Removes the characters covered by the mutation's range.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextDeleteMutator;

impl Mutator for TextDeleteMutator {
    fn mutate(
        &self,
        file_contents: &str,
        mutation: &Mutation,
        _factory: &MutatorFactory,
    ) -> Result<String, MutationError> {
        match mutation.kind {
            MutationKind::TextDelete => Ok(splice(
                file_contents,
                mutation.range.begin,
                mutation.effective_end(),
                "",
            )),
            _ => Err(unexpected(TEXT_DELETE, mutation)),
        }
    }
}

/// Inserts text at the mutation's `begin`, pushing existing content right.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextInsertMutator;

impl Mutator for TextInsertMutator {
    fn mutate(
        &self,
        file_contents: &str,
        mutation: &Mutation,
        _factory: &MutatorFactory,
    ) -> Result<String, MutationError> {
        match &mutation.kind {
            MutationKind::TextInsert { insertion } => Ok(splice(
                file_contents,
                mutation.range.begin,
                mutation.range.begin,
                insertion,
            )),
            _ => Err(unexpected(TEXT_INSERT, mutation)),
        }
    }
}

/// Expands one replacement template for a single match.
///
/// Templates follow the ECMAScript `String.prototype.replace` rules linters
/// emit them in: `$$` is a literal dollar, `$&` the whole match, `` $` `` and
/// `$'` the text before and after the match, `$n`/`$nn` a numbered group and
/// `$<name>` a named group. Anything else, including references to groups that
/// do not exist, is copied through literally.
fn expand_replacement(
    template: &str,
    captures: &Captures<'_>,
    haystack: &str,
    has_named_groups: bool,
) -> String {
    let mut expanded = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(dollar) = rest.find('$') {
        expanded.push_str(&rest[..dollar]);
        rest = &rest[dollar + 1..];
        let consumed = expand_token(rest, captures, haystack, has_named_groups, &mut expanded);
        rest = &rest[consumed..];
    }
    expanded.push_str(rest);
    expanded
}

/// Expands the token following a `$`, returning how many bytes of `after` it used.
fn expand_token(
    after: &str,
    captures: &Captures<'_>,
    haystack: &str,
    has_named_groups: bool,
    expanded: &mut String,
) -> usize {
    let Some(whole) = captures.get(0) else {
        expanded.push('$');
        return 0;
    };
    let push_group = |expanded: &mut String, index: usize| {
        if let Some(group) = captures.get(index) {
            expanded.push_str(group.as_str());
        }
    };
    let groups = captures.len() - 1;
    let bytes = after.as_bytes();

    match bytes.first().copied() {
        Some(b'$') => {
            expanded.push('$');
            1
        }
        Some(b'&') => {
            expanded.push_str(whole.as_str());
            1
        }
        Some(b'`') => {
            expanded.push_str(&haystack[..whole.start()]);
            1
        }
        Some(b'\'') => {
            expanded.push_str(&haystack[whole.end()..]);
            1
        }
        Some(first) if first.is_ascii_digit() => {
            let first = usize::from(first - b'0');
            if let Some(&second) = bytes.get(1).filter(|b| b.is_ascii_digit()) {
                let index = first * 10 + usize::from(second - b'0');
                if (1..=groups).contains(&index) {
                    push_group(expanded, index);
                    return 2;
                }
            }
            if (1..=groups).contains(&first) {
                push_group(expanded, first);
                return 1;
            }
            expanded.push('$');
            0
        }
        Some(b'<') if has_named_groups => match after.find('>') {
            Some(close) => {
                if let Some(group) = captures.name(&after[1..close]) {
                    expanded.push_str(group.as_str());
                }
                close + 1
            }
            None => {
                expanded.push('$');
                0
            }
        },
        _ => {
            expanded.push('$');
            0
        }
    }
}

/// Replaces every match of a regular expression across the whole file.
///
/// The mutation's range is ignored. See [`expand_replacement`] for the
/// replacement template syntax.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextReplaceMutator;

impl Mutator for TextReplaceMutator {
    fn mutate(
        &self,
        file_contents: &str,
        mutation: &Mutation,
        _factory: &MutatorFactory,
    ) -> Result<String, MutationError> {
        match &mutation.kind {
            MutationKind::TextReplace { search, replace } => {
                let pattern = Regex::new(search).map_err(|source| MutationError::InvalidPattern {
                    pattern: search.clone(),
                    source,
                })?;
                let has_named_groups = pattern.capture_names().any(|name| name.is_some());
                Ok(pattern
                    .replace_all(file_contents, |captures: &Captures<'_>| {
                        expand_replacement(replace, captures, file_contents, has_named_groups)
                    })
                    .into_owned())
            }
            _ => Err(unexpected(TEXT_REPLACE, mutation)),
        }
    }
}

/// Replaces the characters covered by the mutation's range with new text.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextSwapMutator;

impl Mutator for TextSwapMutator {
    fn mutate(
        &self,
        file_contents: &str,
        mutation: &Mutation,
        _factory: &MutatorFactory,
    ) -> Result<String, MutationError> {
        match &mutation.kind {
            MutationKind::TextSwap { insertion } => Ok(splice(
                file_contents,
                mutation.range.begin,
                mutation.effective_end(),
                insertion,
            )),
            _ => Err(unexpected(TEXT_SWAP, mutation)),
        }
    }
}

/// Applies a group of child mutations as one logical edit.
///
/// Children are applied last-to-first, each dispatched through the factory, so
/// they may be of any registered type (including nested `multiple`s).
#[derive(Debug, Default, Clone, Copy)]
pub struct MultipleMutator;

impl Mutator for MultipleMutator {
    fn mutate(
        &self,
        file_contents: &str,
        mutation: &Mutation,
        factory: &MutatorFactory,
    ) -> Result<String, MutationError> {
        let MutationKind::Multiple { mutations } = &mutation.kind else {
            return Err(unexpected(MULTIPLE, mutation));
        };

        let mut contents = file_contents.to_string();
        for child in order_last_to_first(mutations) {
            contents = factory.generate_and_apply(&contents, child)?;
        }
        Ok(contents)
    }
}
