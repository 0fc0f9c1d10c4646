use std::{sync::Arc, time::SystemTime};

use wiring::*;

// Define regular traits and implementor structs

trait Logger: Send + Sync {
    fn log(&self, content: &str);
}

trait DateLogger: Send + Sync {
    fn log_date(&self);
}

#[derive(Default)]
struct LoggerImpl;

impl Logger for LoggerImpl {
    fn log(&self, content: &str) {
        println!("{}", content);
    }
}

impl Injectable for LoggerImpl {
    type Deps = ();
    fn inject(_: ()) -> Self {
        LoggerImpl
    }
}

struct DateLoggerImpl {
    logger: Arc<dyn Logger>,
}

impl DateLogger for DateLoggerImpl {
    fn log_date(&self) {
        let secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        self.logger.log(&format!("{}s since epoch", secs));
    }
}

impl Injectable for DateLoggerImpl {
    type Deps = (Arc<dyn Logger>,);
    fn inject((logger,): Self::Deps) -> Self {
        Self { logger }
    }
}

implements!(LoggerImpl => dyn Logger);
implements!(DateLoggerImpl => dyn DateLogger);

/// Only asks for the date logger when it is actually used
struct Reporter {
    dates: Provider<dyn DateLogger>,
}

impl Injectable for Reporter {
    type Deps = (Provider<dyn DateLogger>,);
    fn inject((dates,): Self::Deps) -> Self {
        Self { dates }
    }
}

fn logging() -> Component {
    Component::new("logging")
        .register::<LoggerImpl>()
        .bind::<dyn Logger, LoggerImpl>()
        .register::<DateLoggerImpl>()
        .bind::<dyn DateLogger, DateLoggerImpl>()
}

fn main() -> Result<(), WiringError> {
    // Validate the logging bindings once, then reuse them in as many injectors as needed
    let normalized = NormalizedComponent::new(logging())?;
    let injector = normalized.injector(Component::new("app").register::<Reporter>())?;

    let reporter: Arc<Reporter> = injector.get()?;
    assert!(!injector.is_constructed(&TypeKey::of::<DateLoggerImpl>()));

    reporter.dates.get()?.log_date();

    let logger: Arc<dyn Logger> = injector.get()?;
    logger.log("done");

    Ok(())
}
