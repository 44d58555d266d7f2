use thiserror::Error;

use crate::token::Token;

/// Failures while producing an instance for a token.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("token {token} is not visible from module '{module}'")]
    UnknownToken { token: Token, module: String },

    #[error("alias cycle detected: {}", format_path(path))]
    AliasCycle { path: Vec<Token> },

    #[error("failed to construct {token}")]
    ConstructorFailure {
        token: Token,
        #[source]
        source: anyhow::Error,
    },

    #[error("instance of {token} is not a {expected}")]
    TypeMismatch { token: Token, expected: &'static str },

    #[error("{token} is request-scoped and cannot be resolved outside a request")]
    RequestScopeRequired { token: Token },
}

/// Failures while assembling the module graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("cyclic module import detected: {}", path.join(" -> "))]
    CyclicModuleImport { path: Vec<String> },

    #[error("cyclic provider dependency detected: {}", path.join(" -> "))]
    DependencyCycle { path: Vec<String> },

    #[error("module '{module}' exports {export}, which it neither provides nor imports")]
    UnknownExport { module: String, export: String },

    #[error("module '{module}': dependency of {provider} cannot be resolved")]
    UnresolvedDependency {
        module: String,
        provider: Token,
        #[source]
        source: ResolutionError,
    },

    #[error("dynamic module '{module}' registration failed")]
    DynamicModule {
        module: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Startup failures; the originating error is kept as the source.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("{hook} failed for module '{module}'")]
    Hook {
        module: String,
        hook: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

/// Failures that escape the request pipeline and reach the transport adapter.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("exception filter failed while handling: {original}")]
    FilterFailure {
        original: String,
        #[source]
        source: anyhow::Error,
    },
}

fn format_path(path: &[Token]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}
