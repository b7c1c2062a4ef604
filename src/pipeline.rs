//! The three entry points host code calls: `rewrite`, `build_transformed_url`
//! and `build_srcset`, bound to one provider configuration.
//!
//! A [`Pipeline`] holds no mutable state. Share one across threads and call it
//! from as many as you like.

use crate::config::{ConfigError, EdgeConfig};
use crate::rewrite::{RewriteOutcome, Rewriter};
use crate::transform::{
    ArgError, DimensionResolver, Dimensions, ImageInspector, Provider, SrcsetTransformer,
    TransformArgs, WidthPolicy,
};
use crate::types::Context;

pub struct Pipeline {
    rewriter: Rewriter,
}

impl Pipeline {
    /// `overrides` sit between the provider defaults and per-call arguments.
    pub fn new(
        provider: Provider,
        policy: WidthPolicy,
        overrides: &TransformArgs,
        resolver: DimensionResolver,
    ) -> Self {
        let transformer = SrcsetTransformer::new(provider, policy, overrides);
        Self {
            rewriter: Rewriter::new(transformer, resolver),
        }
    }

    pub fn from_config(config: &EdgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let inspector = config
            .dimensions
            .inspector()
            .map(|i| Box::new(i) as Box<dyn ImageInspector>);
        let resolver = DimensionResolver::new(config.dimensions.registry(), inspector);
        Ok(Self::new(
            config.provider.to_provider()?,
            config.srcset.clone(),
            &config.transform.overrides(),
            resolver,
        ))
    }

    pub fn provider(&self) -> &Provider {
        self.rewriter.transformer().provider()
    }

    pub fn transformer(&self) -> &SrcsetTransformer {
        self.rewriter.transformer()
    }

    /// Rewrite image markup in `content`.
    pub fn rewrite(&self, content: &str, context: Context) -> String {
        self.rewriter.rewrite(content, context).content
    }

    /// Like [`rewrite`](Self::rewrite), with a report for every matched element.
    pub fn rewrite_detailed(&self, content: &str, context: Context) -> RewriteOutcome {
        self.rewriter.rewrite(content, context)
    }

    /// The provider URL for `path`. Unknown keys and invalid values in `args`
    /// are dropped; an already-transformed `path` comes back unchanged.
    pub fn build_transformed_url<I, K, V>(&self, path: &str, args: I) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let transformer = self.rewriter.transformer();
        let merged = transformer
            .base_args()
            .merged(&TransformArgs::from_raw(args));
        transformer.provider().build_url(path, &merged)
    }

    /// The `srcset` for `source_url`, or `""` when it should not have one.
    pub fn build_srcset<I, K, V>(
        &self,
        source_url: &str,
        dimensions: Option<Dimensions>,
        sizes: &str,
        extra_args: I,
    ) -> String
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.rewriter.transformer().transform(
            source_url,
            dimensions,
            sizes,
            &TransformArgs::from_raw(extra_args),
        )
    }

    /// Resolve raw args the way every entry point does, reporting what was dropped.
    pub fn resolve_args<I, K, V>(&self, args: I) -> (TransformArgs, Vec<ArgError>)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let (parsed, dropped) = TransformArgs::parse_raw(args);
        (
            self.rewriter.transformer().base_args().merged(&parsed),
            dropped,
        )
    }
}
