mod controller;
mod field;
mod projection;
mod submit;

#[cfg(test)]
mod tests;

pub use controller::{
    Defer, FieldListener, FormController, FormError, FormOptions, FormResult, ListenerId,
    ValidationReport, ValidationTicket,
};
pub use field::{
    BoxedSetterFuture, BoxedValidatorFuture, Field, FieldError, FormObject, FormValues, GetterFn,
    SetterFn, Validate, ValidatorFn, ValidatorOptions, ValidatorResult,
};
pub use projection::DataOptions;
pub use submit::{
    BoxedHandlerFuture, FormHandler, SubmitController, SubmitOptions, SubmitOutcome, SubmitStatus,
    is_dirty,
};
