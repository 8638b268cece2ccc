//! Live stage sequence of one connection
//!
//! The chain is an ordered list of slots. Each segment occupies a contiguous
//! run delimited by a start and an end anchor:
//!
//! ```text
//! [start:a] a.decode a.handle [end:a] [start:b] b.handle [end:b]
//! ```
//!
//! Dispatching into a segment starts right after its start anchor. A message
//! that reaches the end anchor was not consumed by any stage. It never leaks
//! into the next segment: the run fails with [`ChainError::Unhandled`].

use crate::outbox::Outbox;
use crate::stage::{BoxError, Stage, StageContext};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while editing or running a chain
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("Unknown segment: {0}")]
    UnknownSegment(String),

    #[error("Stage [{stage}] already exists in segment [{segment}]")]
    DuplicateStage { segment: String, stage: String },

    #[error("Stage [{stage}] not found in segment [{segment}]")]
    StageNotFound { segment: String, stage: String },

    #[error("Message reached the end of segment [{0}] without being handled")]
    Unhandled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AnchorKind {
    Start,
    End,
}

pub(crate) enum Slot<M, O> {
    Anchor {
        segment: String,
        kind: AnchorKind,
    },
    Stage {
        name: String,
        stage: Box<dyn Stage<M, O>>,
    },
}

impl<M, O> Slot<M, O> {
    fn is_anchor(&self, name: &str, expected: AnchorKind) -> bool {
        matches!(self, Slot::Anchor { segment, kind } if segment == name && *kind == expected)
    }

    fn stage_name(&self) -> Option<&str> {
        match self {
            Slot::Stage { name, .. } => Some(name),
            Slot::Anchor { .. } => None,
        }
    }
}

pub(crate) fn run_slots<M, O>(
    slots: &mut [Slot<M, O>],
    segment: &str,
    msg: M,
    outbox: &mut Outbox<O>,
) -> Result<(), BoxError> {
    let Some((head, rest)) = slots.split_first_mut() else {
        return Err(ChainError::Unhandled(segment.to_string()).into());
    };

    match head {
        Slot::Anchor {
            kind: AnchorKind::End,
            ..
        } => {
            warn!("Message reached the end of segment [{}]", segment);
            Err(ChainError::Unhandled(segment.to_string()).into())
        }
        Slot::Anchor { .. } => run_slots(rest, segment, msg, outbox),
        Slot::Stage { stage, .. } => {
            let mut ctx = StageContext {
                rest,
                segment,
                outbox,
            };
            stage.handle(&mut ctx, msg)
        }
    }
}

/// Ordered stage sequence with anchored segments
pub struct StageChain<M, O> {
    slots: Vec<Slot<M, O>>,
}

impl<M, O> StageChain<M, O> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Append a segment's anchors, or return the existing segment
    pub fn splice(&mut self, name: &str) -> Segment<'_, M, O> {
        if !self.contains(name) {
            debug!("Splicing segment [{}]", name);
            self.slots.push(Slot::Anchor {
                segment: name.to_string(),
                kind: AnchorKind::Start,
            });
            self.slots.push(Slot::Anchor {
                segment: name.to_string(),
                kind: AnchorKind::End,
            });
        }
        Segment {
            chain: self,
            name: name.to_string(),
        }
    }

    pub fn segment(&mut self, name: &str) -> Option<Segment<'_, M, O>> {
        if self.contains(name) {
            Some(Segment {
                chain: self,
                name: name.to_string(),
            })
        } else {
            None
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.is_anchor(name, AnchorKind::Start))
    }

    /// Drop a segment, anchors and stages included
    pub fn remove(&mut self, name: &str) -> Result<(), ChainError> {
        let (start, end) = self.bounds(name)?;
        self.slots.drain(start..=end);
        debug!("Removed segment [{}]", name);
        Ok(())
    }

    /// Dispatch a message into a segment
    pub fn run(&mut self, segment: &str, msg: M, outbox: &mut Outbox<O>) -> Result<(), BoxError> {
        let (start, end) = self.bounds(segment)?;
        run_slots(&mut self.slots[start + 1..=end], segment, msg, outbox)
    }

    /// Stage names of a segment, in order
    pub fn stage_names(&self, segment: &str) -> Result<Vec<&str>, ChainError> {
        let (start, end) = self.bounds(segment)?;
        Ok(self.slots[start + 1..end]
            .iter()
            .filter_map(Slot::stage_name)
            .collect())
    }

    /// Number of segments spliced in
    pub fn segment_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| {
                matches!(
                    slot,
                    Slot::Anchor {
                        kind: AnchorKind::Start,
                        ..
                    }
                )
            })
            .count()
    }

    fn bounds(&self, name: &str) -> Result<(usize, usize), ChainError> {
        let start = self
            .slots
            .iter()
            .position(|slot| slot.is_anchor(name, AnchorKind::Start))
            .ok_or_else(|| ChainError::UnknownSegment(name.to_string()))?;
        let end = self.slots[start..]
            .iter()
            .position(|slot| slot.is_anchor(name, AnchorKind::End))
            .map(|offset| start + offset)
            .ok_or_else(|| ChainError::UnknownSegment(name.to_string()))?;
        Ok((start, end))
    }
}

impl<M, O> Default for StageChain<M, O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle on one segment of a chain.
///
/// Insertions are relative to the segment's own anchors, so stages added here
/// can never land in a neighbouring segment.
pub struct Segment<'a, M, O> {
    chain: &'a mut StageChain<M, O>,
    name: String,
}

impl<'a, M, O> Segment<'a, M, O> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a stage right after the start anchor
    pub fn add_first(
        &mut self,
        name: impl Into<String>,
        stage: impl Stage<M, O> + 'static,
    ) -> Result<&mut Self, ChainError> {
        let name = self.check_unique(name.into())?;
        let (start, _) = self.chain.bounds(&self.name)?;
        self.insert(start + 1, name, Box::new(stage));
        Ok(self)
    }

    /// Insert a stage right before the end anchor
    pub fn add_last(
        &mut self,
        name: impl Into<String>,
        stage: impl Stage<M, O> + 'static,
    ) -> Result<&mut Self, ChainError> {
        let name = self.check_unique(name.into())?;
        let (_, end) = self.chain.bounds(&self.name)?;
        self.insert(end, name, Box::new(stage));
        Ok(self)
    }

    /// Insert a stage right before the stage named `base`
    pub fn add_before(
        &mut self,
        base: &str,
        name: impl Into<String>,
        stage: impl Stage<M, O> + 'static,
    ) -> Result<&mut Self, ChainError> {
        let name = self.check_unique(name.into())?;
        let position = self.position(base)?;
        self.insert(position, name, Box::new(stage));
        Ok(self)
    }

    /// Insert a stage right after the stage named `base`
    pub fn add_after(
        &mut self,
        base: &str,
        name: impl Into<String>,
        stage: impl Stage<M, O> + 'static,
    ) -> Result<&mut Self, ChainError> {
        let name = self.check_unique(name.into())?;
        let position = self.position(base)?;
        self.insert(position + 1, name, Box::new(stage));
        Ok(self)
    }

    /// Take a stage out of the segment
    pub fn remove(&mut self, name: &str) -> Result<Box<dyn Stage<M, O>>, ChainError> {
        let position = self.position(name)?;
        match self.chain.slots.remove(position) {
            Slot::Stage { stage, .. } => Ok(stage),
            Slot::Anchor { .. } => Err(self.not_found(name)),
        }
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.chain.stage_names(&self.name).unwrap_or_default()
    }

    fn insert(&mut self, position: usize, name: String, stage: Box<dyn Stage<M, O>>) {
        debug!("Adding stage [{}] to segment [{}]", name, self.name);
        self.chain
            .slots
            .insert(position, Slot::Stage { name, stage });
    }

    fn position(&self, stage: &str) -> Result<usize, ChainError> {
        let (start, end) = self.chain.bounds(&self.name)?;
        self.chain.slots[start + 1..end]
            .iter()
            .position(|slot| slot.stage_name() == Some(stage))
            .map(|offset| start + 1 + offset)
            .ok_or_else(|| self.not_found(stage))
    }

    fn check_unique(&self, stage: String) -> Result<String, ChainError> {
        if self.position(&stage).is_ok() {
            return Err(ChainError::DuplicateStage {
                segment: self.name.clone(),
                stage,
            });
        }
        Ok(stage)
    }

    fn not_found(&self, stage: &str) -> ChainError {
        ChainError::StageNotFound {
            segment: self.name.clone(),
            stage: stage.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::stage_fn;

    fn tagger(tag: &'static str) -> impl Stage<String, String> {
        stage_fn(move |ctx: &mut StageContext<'_, String, String>, msg: String| {
            ctx.forward(format!("{}{}", msg, tag))
        })
    }

    fn sink() -> impl Stage<String, String> {
        stage_fn(|ctx: &mut StageContext<'_, String, String>, msg: String| {
            let line = format!("{}@{}", msg, ctx.segment());
            ctx.write(line);
            Ok(())
        })
    }

    #[test]
    fn test_segment_insertion_order() {
        let mut chain: StageChain<String, String> = StageChain::new();
        let mut segment = chain.splice("a");
        segment.add_last("sink", sink()).unwrap();
        segment.add_first("first", tagger("1")).unwrap();
        segment.add_before("sink", "before", tagger("2")).unwrap();
        segment.add_after("first", "after", tagger("3")).unwrap();

        assert_eq!(
            chain.stage_names("a").unwrap(),
            vec!["first", "after", "before", "sink"]
        );

        let mut outbox = Outbox::new();
        chain.run("a", "m".to_string(), &mut outbox).unwrap();
        assert_eq!(outbox.items(), &["m132@a".to_string()]);
    }

    #[test]
    fn test_segments_are_isolated() {
        let mut chain: StageChain<String, String> = StageChain::new();
        chain.splice("a").add_last("tag", tagger("a")).unwrap();
        chain.splice("b").add_last("sink", sink()).unwrap();

        let mut outbox = Outbox::new();
        assert!(chain.run("a", "m".to_string(), &mut outbox).is_err());
        assert!(outbox.is_empty());

        chain.run("b", "m".to_string(), &mut outbox).unwrap();
        assert_eq!(outbox.items(), &["m@b".to_string()]);

        // Adding to the first segment later still lands inside it
        chain.splice("a").add_last("sink", sink()).unwrap();
        chain.run("a", "m".to_string(), &mut outbox).unwrap();
        assert_eq!(outbox.items()[1], "ma@a");
        assert_eq!(chain.segment_count(), 2);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut chain: StageChain<String, String> = StageChain::new();
        let mut segment = chain.splice("a");
        segment.add_last("sink", sink()).unwrap();
        let err = segment.add_last("sink", sink()).err().unwrap();
        assert_eq!(
            err,
            ChainError::DuplicateStage {
                segment: "a".to_string(),
                stage: "sink".to_string()
            }
        );
    }

    #[test]
    fn test_same_stage_name_in_two_segments() {
        let mut chain: StageChain<String, String> = StageChain::new();
        chain.splice("a").add_last("sink", sink()).unwrap();
        chain.splice("b").add_last("sink", sink()).unwrap();
        assert_eq!(chain.stage_names("b").unwrap(), vec!["sink"]);
    }

    #[test]
    fn test_unknown_segment() {
        let mut chain: StageChain<String, String> = StageChain::new();
        let mut outbox = Outbox::new();
        let err = chain.run("nope", "m".to_string(), &mut outbox).unwrap_err();
        assert_eq!(err.to_string(), "Unknown segment: nope");
        assert!(chain.segment("nope").is_none());
    }

    #[test]
    fn test_remove_stage_and_segment() {
        let mut chain: StageChain<String, String> = StageChain::new();
        let mut segment = chain.splice("a");
        segment.add_last("tag", tagger("x")).unwrap();
        segment.add_last("sink", sink()).unwrap();
        assert!(segment.remove("tag").is_ok());
        assert!(segment.remove("tag").is_err());
        assert_eq!(segment.stage_names(), vec!["sink"]);

        chain.remove("a").unwrap();
        assert!(!chain.contains("a"));
        assert_eq!(chain.segment_count(), 0);
    }

    #[test]
    fn test_unhandled_message_stops_at_end_anchor() {
        let mut chain: StageChain<String, String> = StageChain::new();
        chain.splice("a").add_last("tag", tagger("x")).unwrap();
        chain.splice("b").add_last("sink", sink()).unwrap();

        let mut outbox = Outbox::new();
        let err = chain.run("a", "m".to_string(), &mut outbox).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Message reached the end of segment [a] without being handled"
        );
        assert!(outbox.is_empty());

        chain.splice("empty");
        assert!(chain.run("empty", "m".to_string(), &mut outbox).is_err());
    }
}
