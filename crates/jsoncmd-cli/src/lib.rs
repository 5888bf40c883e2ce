//! jsoncmd CLI library: the command implementations behind the `jsoncmd`
//! binary, exposed so they can be exercised from tests.

pub mod commands;
