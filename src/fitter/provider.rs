//! Object provider - books artifacts that no earlier stage produced

use tracing::{debug, warn};

use crate::flow::{Artifact, ProcessContext, Stage};
use crate::Result;

/// Attempt to build one artifact; `None` hands over to the next builder.
pub type Builder = Box<dyn Fn(&mut ProcessContext) -> Result<Option<Artifact>>>;

/// Stage that fills gaps in the source manager.
///
/// For every key not yet booked, builders are tried in order until one
/// yields an artifact. Keys already booked are left alone.
pub struct ObjProvider {
    name: String,
    objects: Vec<(String, Vec<Builder>)>,
    produced: Vec<(String, Artifact)>,
}

impl std::fmt::Debug for ObjProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjProvider")
            .field("name", &self.name)
            .field("objects", &self.objects.iter().map(|(k, b)| (k, b.len())).collect::<Vec<_>>())
            .field("produced", &self.produced.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

impl ObjProvider {
    /// Provider with no object.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: Vec::new(),
            produced: Vec::new(),
        }
    }

    /// Append a builder for `key`, creating the entry on first use.
    #[must_use]
    pub fn with_builder<F>(mut self, key: impl Into<String>, builder: F) -> Self
    where
        F: Fn(&mut ProcessContext) -> Result<Option<Artifact>> + 'static,
    {
        let key = key.into();
        let builder: Builder = Box::new(builder);
        match self.objects.iter_mut().find(|(k, _)| *k == key) {
            Some((_, builders)) => builders.push(builder),
            None => self.objects.push((key, vec![builder])),
        }
        self
    }

    /// Keys this provider can build, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|(k, _)| k.as_str())
    }
}

impl Stage for ObjProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&mut self, ctx: &mut ProcessContext) -> Result<()> {
        for (key, builders) in &self.objects {
            if ctx.sources()?.contains(key) {
                debug!(stage = %self.name, key = %key, "skipped booked object");
                continue;
            }
            let mut built = None;
            for builder in builders {
                if let Some(obj) = builder(ctx)? {
                    built = Some(obj);
                    break;
                }
            }
            match built {
                Some(obj) => self.produced.push((key.clone(), obj)),
                None => warn!(stage = %self.name, key = %key, "no builder produced the object"),
            }
        }
        Ok(())
    }

    fn publish(&mut self) -> Vec<(String, Artifact)> {
        std::mem::take(&mut self.produced)
    }

    fn reset(&mut self) {
        self.produced.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{artifact, Process};

    #[test]
    fn test_first_successful_builder_wins() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = Process::new("test", dir.path());
        let ctx = process.context_mut();

        let mut provider = ObjProvider::new("objProvider")
            .with_builder("f", |_| Ok(None))
            .with_builder("f", |_| Ok(Some(artifact(2_i32))))
            .with_builder("f", |_| Ok(Some(artifact(3_i32))));
        provider.run(ctx).unwrap();

        let published = provider.publish();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "f");
        assert_eq!(*published[0].1.downcast_ref::<i32>().unwrap(), 2);
        assert!(provider.publish().is_empty());
    }

    #[test]
    fn test_booked_keys_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let mut process = Process::new("test", dir.path());
        let ctx = process.context_mut();
        ctx.sources_mut().unwrap().update("f", artifact(1_i32), Some("reader"));

        let mut provider = ObjProvider::new("objProvider").with_builder("f", |_| Ok(Some(artifact(9_i32))));
        provider.run(ctx).unwrap();
        assert!(provider.publish().is_empty());
        assert_eq!(provider.keys().collect::<Vec<_>>(), vec!["f"]);
    }
}
