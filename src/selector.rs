//! Target selection.
//!
//! The operator builds the required class set through a small command
//! protocol. The protocol is a pure reducer (`SelectorSession::feed`) so it
//! can be replayed from a list of inputs; `select_interactive` is the text
//! driver that renders it on a terminal.

use serde::Serialize;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};

use crate::classes::{ClassName, ClassRegistry};
use crate::error::AccessError;

/// Sentinel used in configuration and listings for "every class".
pub const ALL_TARGETS: &str = "ALL";

/// The classes that must all be present for access to be granted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetSet {
    /// Every detected class counts; completeness is always satisfied.
    All,
    /// Ordered, duplicate-free, non-empty list of required classes.
    Classes(Vec<ClassName>),
}

// `ALL` is written as the bare sentinel string, explicit sets as a list.
impl Serialize for TargetSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TargetSet::All => serializer.serialize_str(ALL_TARGETS),
            TargetSet::Classes(classes) => classes.serialize(serializer),
        }
    }
}

impl TargetSet {
    /// Build a required set. Duplicates are dropped (first occurrence wins);
    /// an empty list is refused so `ALL` is always an explicit choice.
    pub fn classes(classes: Vec<ClassName>) -> Result<Self, AccessError> {
        let mut unique: Vec<ClassName> = Vec::with_capacity(classes.len());
        for class in classes {
            if !unique.contains(&class) {
                unique.push(class);
            }
        }
        if unique.is_empty() {
            return Err(AccessError::InvalidCommand {
                input: "empty target set (use ALL explicitly)".to_string(),
            });
        }
        Ok(TargetSet::Classes(unique))
    }

    /// Resolve configured labels. `["ALL"]` selects every class.
    pub fn resolve<S: AsRef<str>>(
        registry: &ClassRegistry,
        labels: &[S],
    ) -> Result<Self, AccessError> {
        if labels.len() == 1 && labels[0].as_ref().trim() == ALL_TARGETS {
            return Ok(TargetSet::All);
        }
        let classes = labels
            .iter()
            .map(|label| registry.resolve(label.as_ref().trim()).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        Self::classes(classes)
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TargetSet::All)
    }

    pub fn contains(&self, class: &ClassName) -> bool {
        match self {
            TargetSet::All => true,
            TargetSet::Classes(classes) => classes.contains(class),
        }
    }

    /// Classes counted during a run, in order.
    pub fn scope(&self, registry: &ClassRegistry) -> Vec<ClassName> {
        match self {
            TargetSet::All => registry.all_classes().to_vec(),
            TargetSet::Classes(classes) => classes.clone(),
        }
    }

    /// Short human summary: first three names plus a total.
    pub fn summary(&self) -> String {
        match self {
            TargetSet::All => format!("{} (every class)", ALL_TARGETS),
            TargetSet::Classes(classes) => summarize(classes, 3),
        }
    }
}

fn summarize(classes: &[ClassName], shown: usize) -> String {
    let names: Vec<&str> = classes.iter().take(shown).map(|c| c.as_str()).collect();
    let more = if classes.len() > shown { ", ..." } else { "" };
    format!("{}{} ({} total)", names.join(", "), more, classes.len())
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorCommand {
    /// Toggle the class at a 1-based registry index.
    Toggle(usize),
    SelectAll,
    List,
    Clear,
    Commit,
    Abort,
}

impl SelectorCommand {
    /// Parse one line of operator input. Whitespace and case are ignored.
    pub fn parse(input: &str) -> Result<Self, AccessError> {
        let cmd = input.trim().to_lowercase();
        match cmd.as_str() {
            "select-all" | "all" => Ok(SelectorCommand::SelectAll),
            "list" | "ls" => Ok(SelectorCommand::List),
            "clear" => Ok(SelectorCommand::Clear),
            "commit" | "done" => Ok(SelectorCommand::Commit),
            "abort" | "cancel" | "quit" => Ok(SelectorCommand::Abort),
            other => other
                .parse::<usize>()
                .map(SelectorCommand::Toggle)
                .map_err(|_| AccessError::InvalidCommand {
                    input: input.trim().to_string(),
                }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionOutcome {
    Committed(TargetSet),
    /// The enclosing operation is cancelled; this is never `ALL`.
    Aborted,
}

/// Observable result of one reducer step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectorEffect {
    Added(ClassName),
    Removed(ClassName),
    SelectedAll(usize),
    Listed(Vec<ClassName>),
    Cleared,
    /// Commit on an empty set: the next input answers "use ALL?".
    ConfirmAll,
    /// The operator declined `ALL`; the session continues.
    Declined,
    Finished(SelectionOutcome),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Editing,
    ConfirmingAll,
    Done,
}

/// Selection state machine over a registry.
#[derive(Clone, Debug)]
pub struct SelectorSession<'r> {
    registry: &'r ClassRegistry,
    working: Vec<ClassName>,
    phase: Phase,
}

impl<'r> SelectorSession<'r> {
    pub fn new(registry: &'r ClassRegistry) -> Self {
        Self {
            registry,
            working: Vec::new(),
            phase: Phase::Editing,
        }
    }

    /// Start from an existing working set (duplicates dropped).
    pub fn with_selection(registry: &'r ClassRegistry, initial: &[ClassName]) -> Self {
        let mut session = Self::new(registry);
        for class in initial {
            if !session.working.contains(class) {
                session.working.push(class.clone());
            }
        }
        session
    }

    pub fn working_set(&self) -> &[ClassName] {
        &self.working
    }

    pub fn awaiting_confirmation(&self) -> bool {
        self.phase == Phase::ConfirmingAll
    }

    pub fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Feed one line of input. While a confirmation is pending the line is
    /// the yes/no answer; otherwise it is parsed as a command.
    pub fn feed(&mut self, input: &str) -> Result<SelectorEffect, AccessError> {
        match self.phase {
            Phase::ConfirmingAll => Ok(self.confirm(is_yes(input))),
            _ => {
                let command = SelectorCommand::parse(input)?;
                self.apply(command)
            }
        }
    }

    /// Apply a command. Errors leave the working set untouched.
    pub fn apply(&mut self, command: SelectorCommand) -> Result<SelectorEffect, AccessError> {
        if self.phase == Phase::Done {
            return Err(AccessError::InvalidCommand {
                input: "session already finished".to_string(),
            });
        }
        if self.phase == Phase::ConfirmingAll {
            return Err(AccessError::InvalidCommand {
                input: "awaiting yes/no confirmation".to_string(),
            });
        }
        let effect = match command {
            SelectorCommand::Toggle(index) => {
                let class = self.registry.by_index(index)?.clone();
                if let Some(pos) = self.working.iter().position(|c| *c == class) {
                    self.working.remove(pos);
                    SelectorEffect::Removed(class)
                } else {
                    self.working.push(class.clone());
                    SelectorEffect::Added(class)
                }
            }
            SelectorCommand::SelectAll => {
                self.working = self.registry.all_classes().to_vec();
                SelectorEffect::SelectedAll(self.working.len())
            }
            SelectorCommand::List => SelectorEffect::Listed(self.working.clone()),
            SelectorCommand::Clear => {
                self.working.clear();
                SelectorEffect::Cleared
            }
            SelectorCommand::Commit => {
                if self.working.is_empty() {
                    self.phase = Phase::ConfirmingAll;
                    SelectorEffect::ConfirmAll
                } else {
                    self.phase = Phase::Done;
                    SelectorEffect::Finished(SelectionOutcome::Committed(TargetSet::Classes(
                        self.working.clone(),
                    )))
                }
            }
            SelectorCommand::Abort => {
                self.phase = Phase::Done;
                SelectorEffect::Finished(SelectionOutcome::Aborted)
            }
        };
        Ok(effect)
    }

    /// Answer a pending "use ALL?" prompt.
    pub fn confirm(&mut self, use_all: bool) -> SelectorEffect {
        if self.phase != Phase::ConfirmingAll {
            return SelectorEffect::Declined;
        }
        if use_all {
            self.phase = Phase::Done;
            SelectorEffect::Finished(SelectionOutcome::Committed(TargetSet::All))
        } else {
            self.phase = Phase::Editing;
            SelectorEffect::Declined
        }
    }
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Result of replaying a command stream.
#[derive(Debug)]
pub struct Replay {
    /// `None` when the stream ended before the session finished.
    pub outcome: Option<SelectionOutcome>,
    pub effects: Vec<Result<SelectorEffect, AccessError>>,
    pub working_set: Vec<ClassName>,
}

/// Replay inputs against a fresh session, stopping once it finishes.
pub fn replay<I, S>(registry: &ClassRegistry, inputs: I) -> Replay
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    replay_from(registry, &[], inputs)
}

/// Replay inputs against a session seeded with `initial`.
pub fn replay_from<I, S>(registry: &ClassRegistry, initial: &[ClassName], inputs: I) -> Replay
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut session = SelectorSession::with_selection(registry, initial);
    let mut effects = Vec::new();
    let mut outcome = None;
    for input in inputs {
        let effect = session.feed(input.as_ref());
        if let Ok(SelectorEffect::Finished(done)) = &effect {
            outcome = Some(done.clone());
        }
        effects.push(effect);
        if outcome.is_some() {
            break;
        }
    }
    Replay {
        outcome,
        effects,
        working_set: session.working_set().to_vec(),
    }
}

/// Run a selection session over text I/O.
///
/// End of input before the session finishes is treated as an abort.
pub fn select_interactive<R: BufRead, W: Write>(
    registry: &ClassRegistry,
    mut input: R,
    output: &mut W,
) -> Result<SelectionOutcome> {
    render_catalog(registry, output)?;
    let mut session = SelectorSession::new(registry);
    let mut line = String::new();
    loop {
        if session.awaiting_confirmation() {
            write!(output, "No classes selected. Use {} classes? (y/n): ", ALL_TARGETS)?;
        } else {
            render_status(session.working_set(), output)?;
            write!(output, "> ")?;
        }
        output.flush()?;

        line.clear();
        let read = input.read_line(&mut line).context("read selector input")?;
        if read == 0 {
            writeln!(output)?;
            return Ok(SelectionOutcome::Aborted);
        }

        match session.feed(&line) {
            Ok(SelectorEffect::Finished(outcome)) => return Ok(outcome),
            Ok(effect) => render_effect(&effect, output)?,
            Err(AccessError::OutOfRangeSelection { max, .. }) => {
                writeln!(output, "Number out of range (1-{})", max)?
            }
            Err(err) => writeln!(
                output,
                "{} (use a number, select-all, list, clear, commit or abort)",
                err
            )?,
        }
    }
}

fn render_catalog<W: Write>(registry: &ClassRegistry, output: &mut W) -> Result<()> {
    let groups = registry.groups();
    let mut index = 1;
    for (title, classes) in [
        ("Equipment", groups.equipment),
        ("Missing equipment", groups.missing),
        ("Other", groups.other),
    ] {
        if classes.is_empty() {
            continue;
        }
        writeln!(output, "{}:", title)?;
        for class in classes {
            writeln!(output, "  [{:2}] {}", index, class)?;
            index += 1;
        }
    }
    writeln!(
        output,
        "Commands: 1-{} toggle, select-all, list, clear, commit, abort",
        registry.len()
    )?;
    Ok(())
}

fn render_status<W: Write>(working: &[ClassName], output: &mut W) -> Result<()> {
    if working.is_empty() {
        writeln!(output, "Selected: none")?;
    } else {
        writeln!(output, "Selected: {}", summarize(working, 3))?;
    }
    Ok(())
}

fn render_effect<W: Write>(effect: &SelectorEffect, output: &mut W) -> Result<()> {
    match effect {
        SelectorEffect::Added(class) => writeln!(output, "+ {}", class)?,
        SelectorEffect::Removed(class) => writeln!(output, "- {}", class)?,
        SelectorEffect::SelectedAll(count) => writeln!(output, "{} classes selected", count)?,
        SelectorEffect::Listed(classes) if classes.is_empty() => {
            writeln!(output, "Selection is empty")?
        }
        SelectorEffect::Listed(classes) => {
            for (i, class) in classes.iter().enumerate() {
                writeln!(output, "  {}. {}", i + 1, class)?;
            }
        }
        SelectorEffect::Cleared => writeln!(output, "Selection cleared")?,
        SelectorEffect::Declined => writeln!(output, "Keep selecting")?,
        SelectorEffect::ConfirmAll | SelectorEffect::Finished(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(classes: &[ClassName]) -> Vec<&str> {
        classes.iter().map(|c| c.as_str()).collect()
    }

    #[test]
    fn parse_recognizes_commands() {
        assert_eq!(SelectorCommand::parse(" 4 ").unwrap(), SelectorCommand::Toggle(4));
        assert_eq!(SelectorCommand::parse("Commit").unwrap(), SelectorCommand::Commit);
        assert_eq!(
            SelectorCommand::parse("select-all").unwrap(),
            SelectorCommand::SelectAll
        );
        assert_eq!(
            SelectorCommand::parse("hardhat").unwrap_err(),
            AccessError::InvalidCommand {
                input: "hardhat".to_string()
            }
        );
        assert!(SelectorCommand::parse("-1").is_err());
    }

    #[test]
    fn toggling_twice_restores_previous_set() {
        let registry = ClassRegistry::ppe_default();
        let mut session = SelectorSession::new(&registry);
        session.feed("1").unwrap();
        let before = session.working_set().to_vec();
        session.feed("5").unwrap();
        session.feed("5").unwrap();
        assert_eq!(session.working_set(), before.as_slice());
    }

    #[test]
    fn errors_leave_state_untouched() {
        let registry = ClassRegistry::ppe_default();
        let mut session = SelectorSession::new(&registry);
        session.feed("3").unwrap();
        assert!(matches!(
            session.feed("99"),
            Err(AccessError::OutOfRangeSelection { index: 99, max: 14 })
        ));
        assert!(matches!(
            session.feed("vest"),
            Err(AccessError::InvalidCommand { .. })
        ));
        assert_eq!(names(session.working_set()), vec!["Hardhat"]);
        assert!(!session.is_finished());
    }

    #[test]
    fn clear_then_select_all_is_registry_order() {
        let registry = ClassRegistry::ppe_default();
        let mut session = SelectorSession::new(&registry);
        session.feed("7").unwrap();
        session.feed("clear").unwrap();
        assert_eq!(session.feed("select-all").unwrap(), SelectorEffect::SelectedAll(14));
        assert_eq!(session.working_set(), registry.all_classes());
    }

    #[test]
    fn abort_is_not_all() {
        let registry = ClassRegistry::ppe_default();
        let replayed = replay(&registry, ["2", "abort", "commit"]);
        assert_eq!(replayed.outcome, Some(SelectionOutcome::Aborted));
        assert_eq!(replayed.effects.len(), 2);
    }

    #[test]
    fn empty_commit_confirmed_yields_all() {
        let registry = ClassRegistry::ppe_default();
        let replayed = replay(&registry, ["commit", "y"]);
        assert_eq!(
            replayed.outcome,
            Some(SelectionOutcome::Committed(TargetSet::All))
        );
    }

    #[test]
    fn replay_from_seeded_selection() {
        let registry = ClassRegistry::ppe_default();
        let hardhat = registry.resolve("Hardhat").unwrap().clone();
        let replayed = replay_from(&registry, &[hardhat.clone()], ["3", "commit", "n"]);
        assert!(replayed.outcome.is_none());
        assert!(replayed.working_set.is_empty());

        let replayed = replay_from(&registry, &[hardhat.clone()], ["commit"]);
        assert_eq!(
            replayed.outcome,
            Some(SelectionOutcome::Committed(TargetSet::Classes(vec![hardhat])))
        );
    }

    #[test]
    fn unfinished_stream_has_no_outcome() {
        let registry = ClassRegistry::ppe_default();
        let replayed = replay(&registry, ["1", "2", "list"]);
        assert!(replayed.outcome.is_none());
        assert_eq!(names(&replayed.working_set), vec!["Gloves", "Goggles"]);
    }

    #[test]
    fn target_set_resolve_and_dedupe() {
        let registry = ClassRegistry::ppe_default();
        assert_eq!(TargetSet::resolve(&registry, &["ALL"]).unwrap(), TargetSet::All);

        let set = TargetSet::resolve(&registry, &["Hardhat", "Safety Vest", "Hardhat"]).unwrap();
        match &set {
            TargetSet::Classes(classes) => {
                assert_eq!(names(classes), vec!["Hardhat", "Safety Vest"])
            }
            TargetSet::All => panic!("expected explicit classes"),
        }
        assert!(matches!(
            TargetSet::resolve(&registry, &["Helmet"]),
            Err(AccessError::UnknownClass { .. })
        ));
        let empty: [&str; 0] = [];
        assert!(TargetSet::resolve(&registry, &empty).is_err());
    }

    #[test]
    fn interactive_driver_renders_and_commits() {
        let registry = ClassRegistry::ppe_default();
        let input = b"3\nbogus\n5\nlist\ncommit\n" as &[u8];
        let mut output = Vec::new();
        let outcome = select_interactive(&registry, input, &mut output).unwrap();

        let hardhat = registry.resolve("Hardhat").unwrap().clone();
        let vest = registry.resolve("Safety Vest").unwrap().clone();
        assert_eq!(
            outcome,
            SelectionOutcome::Committed(TargetSet::Classes(vec![hardhat, vest]))
        );
        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("[ 3] Hardhat"));
        assert!(text.contains("invalid command 'bogus'"));
        assert!(text.contains("  2. Safety Vest"));
    }

    #[test]
    fn interactive_driver_treats_eof_as_abort() {
        let registry = ClassRegistry::ppe_default();
        let mut output = Vec::new();
        let outcome = select_interactive(&registry, b"1\n" as &[u8], &mut output).unwrap();
        assert_eq!(outcome, SelectionOutcome::Aborted);
    }
}
