pub mod form;
pub mod format;
pub mod i18n;
pub mod validation;
pub mod value;

pub use form::{
    DataOptions, Field, FieldError, FormController, FormError, FormObject, FormOptions,
    FormResult, FormValues, SubmitController, SubmitOptions, SubmitOutcome, SubmitStatus,
    Validate, ValidatorOptions,
};
pub use i18n::{I18nManager, Locale, Translator};
pub use validation::{RuleError, RuleSet, Validation};
pub use value::{FileRef, Value};
