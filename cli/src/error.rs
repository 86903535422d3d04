/// Display global error message in unified format
#[derive(Debug)]
pub struct Error(String, Option<String>);

impl Error {
    pub fn new(message: &str, details: Option<&str>) -> Self {
        Error(message.to_string(), details.map(|d| d.to_string()))
    }

    /// Print the error to stderr as the last thing the user sees
    pub fn print(&self) {
        eprintln!("\n{}\n{self}", console::style("Error").red().bold());
    }
}

/// Display the message and details, as sort of a hint
impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}\n\n{}",
            self.0,
            console::style(self.1.clone().unwrap_or("".into())).dim()
        )
    }
}

/// Implement std::error::Error trait for Error
impl std::error::Error for Error {}

/// Automatically convert all eyre error reports
///
/// Keeps the title and details if the report wraps an Error, otherwise the
/// whole chain of causes becomes the details.
impl From<eyre::ErrReport> for Error {
    fn from(error: eyre::ErrReport) -> Self {
        log::error!("{error:?}");

        error.downcast::<Error>().unwrap_or_else(|err| {
            let causes = err
                .chain()
                .skip(1)
                .map(|cause| cause.to_string())
                .collect::<Vec<_>>()
                .join("\n");

            Error::new(
                &err.to_string(),
                (!causes.is_empty()).then_some(causes.as_str()),
            )
        })
    }
}
