//! Negotiate authentication against a pluggable [`CredentialSupplier`].
//!
//! Methods are tried in the order the server advertised them. For every
//! method the supplier either hands over a credential, declines the method
//! or aborts the whole negotiation. A rejected credential is retried until
//! the supplier's attempt budget for that method runs out, then the next
//! method is tried.
//!
//! Each call to [`authenticate`] starts a fresh [`Negotiation`], so a failed
//! or aborted negotiation leaves nothing behind that would affect the next
//! one.

use crate::{
    lowlevel::{AuthMethod, KeyPair, KeyboardInteractivePrompt, Prompt, Transport},
    Error, Session, TransportError, TransportErrorCode,
};

use std::fmt;

/// Session error code of a rejected credential.
pub const AUTHENTICATION_FAILED: i32 = -18;

/// Session error code of a public key the server would not accept.
pub const PUBLICKEY_UNVERIFIED: i32 = -19;

/// Answer of a [`CredentialSupplier`] to one challenge.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Reply<T> {
    /// Try this credential.
    Credential(T),
    /// Give up on the current method and move on to the next one.
    NextMethod,
    /// Stop authenticating altogether.
    Abort,
}

/// Context handed to the supplier with every challenge.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Challenge<'a> {
    /// User name presented to the server.
    pub user: &'a str,
    /// Attempt number for the current method, starting at 1.
    pub attempt: u32,
    /// Number of attempts the method is allowed.
    pub budget: u32,
}

/// Answers authentication challenges, usually by asking the user.
pub trait CredentialSupplier {
    /// How many credentials may be tried for `method` before moving on.
    fn attempt_budget(&self, _method: &AuthMethod) -> u32 {
        1
    }

    /// Supply a password.
    fn offer_password(&mut self, challenge: &Challenge<'_>) -> Reply<String>;

    /// Answer one batch of keyboard-interactive prompts.
    ///
    /// A credential must carry exactly one response per prompt.
    fn offer_keyboard_interactive(
        &mut self,
        _challenge: &Challenge<'_>,
        _instructions: &str,
        _prompts: &[Prompt<'_>],
    ) -> Reply<Vec<String>> {
        Reply::NextMethod
    }

    /// Supply a key pair.
    fn offer_public_key(&mut self, _challenge: &Challenge<'_>) -> Reply<KeyPair> {
        Reply::NextMethod
    }
}

impl<S: CredentialSupplier + ?Sized> CredentialSupplier for &mut S {
    fn attempt_budget(&self, method: &AuthMethod) -> u32 {
        (**self).attempt_budget(method)
    }

    fn offer_password(&mut self, challenge: &Challenge<'_>) -> Reply<String> {
        (**self).offer_password(challenge)
    }

    fn offer_keyboard_interactive(
        &mut self,
        challenge: &Challenge<'_>,
        instructions: &str,
        prompts: &[Prompt<'_>],
    ) -> Reply<Vec<String>> {
        (**self).offer_keyboard_interactive(challenge, instructions, prompts)
    }

    fn offer_public_key(&mut self, challenge: &Challenge<'_>) -> Reply<KeyPair> {
        (**self).offer_public_key(challenge)
    }
}

/// Where one method stands within a [`Negotiation`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MethodState {
    Untried,
    Trying { attempt: u32 },
    Succeeded,
    /// Every attempt in the budget was rejected.
    Exhausted,
    /// The supplier asked to move on.
    Declined,
    Aborted,
    /// The method is not implemented by this crate.
    Unsupported,
}

impl fmt::Display for MethodState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untried => f.write_str("untried"),
            Self::Trying { attempt } => write!(f, "trying (attempt {attempt})"),
            Self::Succeeded => f.write_str("succeeded"),
            Self::Exhausted => f.write_str("exhausted"),
            Self::Declined => f.write_str("declined"),
            Self::Aborted => f.write_str("aborted"),
            Self::Unsupported => f.write_str("unsupported"),
        }
    }
}

/// Outcome of the transport call for one attempt.
enum Attempt {
    Accepted,
    Rejected,
    Declined,
    Aborted,
}

/// One run of the authentication state machine.
#[derive(Debug, Clone)]
pub struct Negotiation {
    user: String,
    methods: Vec<(AuthMethod, MethodState)>,
}

impl Negotiation {
    /// Start negotiating for `user`.
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            methods: Vec::new(),
        }
    }

    /// The methods offered by the server so far, each with its state.
    pub fn methods(&self) -> &[(AuthMethod, MethodState)] {
        &self.methods
    }

    /// Comma separated `method: state` list, in server order.
    pub fn summary(&self) -> String {
        if self.methods.is_empty() {
            return "server offered no authentication method".into();
        }

        self.methods
            .iter()
            .map(|(method, state)| format!("{method}: {state}"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Drive the negotiation to completion.
    pub fn run<T, S>(&mut self, session: &Session<T>, supplier: &mut S) -> Result<(), Error>
    where
        T: Transport,
        S: CredentialSupplier + ?Sized,
    {
        let offered = {
            let mut guard = session.acquire_lock();
            let transport = guard.transport();

            if transport.authenticated() {
                return Ok(());
            }

            let offered = transport.auth_methods(&self.user)?;

            // Server accepted the `none` method.
            if transport.authenticated() {
                return Ok(());
            }

            offered
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(user = %self.user, ?offered, "negotiating authentication");

        self.methods = offered
            .into_iter()
            .map(|method| (method, MethodState::Untried))
            .collect();

        for index in 0..self.methods.len() {
            let method = self.methods[index].0.clone();

            let state = match &method {
                AuthMethod::Other(_) => MethodState::Unsupported,
                method => self.try_method(index, method, session, supplier)?,
            };
            self.methods[index].1 = state;

            #[cfg(feature = "tracing")]
            tracing::debug!(%method, %state, "authentication method finished");

            match state {
                MethodState::Succeeded => return Ok(()),
                MethodState::Aborted => return Err(Error::Aborted),
                _ => (),
            }
        }

        Err(Error::Authentication {
            user: self.user.clone(),
            summary: self.summary(),
        })
    }

    fn try_method<T, S>(
        &mut self,
        index: usize,
        method: &AuthMethod,
        session: &Session<T>,
        supplier: &mut S,
    ) -> Result<MethodState, Error>
    where
        T: Transport,
        S: CredentialSupplier + ?Sized,
    {
        let budget = supplier.attempt_budget(method);

        for attempt in 1..=budget {
            self.methods[index].1 = MethodState::Trying { attempt };

            let challenge = Challenge {
                user: &self.user,
                attempt,
                budget,
            };

            let outcome = match method {
                AuthMethod::Password => match supplier.offer_password(&challenge) {
                    Reply::Credential(password) => check(
                        session
                            .acquire_lock()
                            .transport()
                            .userauth_password(challenge.user, &password),
                    )?,
                    Reply::NextMethod => Attempt::Declined,
                    Reply::Abort => Attempt::Aborted,
                },
                AuthMethod::PublicKey => match supplier.offer_public_key(&challenge) {
                    Reply::Credential(key) => check(
                        session
                            .acquire_lock()
                            .transport()
                            .userauth_pubkey(challenge.user, &key),
                    )?,
                    Reply::NextMethod => Attempt::Declined,
                    Reply::Abort => Attempt::Aborted,
                },
                AuthMethod::KeyboardInteractive => {
                    let mut prompter = Prompter {
                        supplier: &mut *supplier,
                        challenge,
                        reply: None,
                    };

                    let res = session
                        .acquire_lock()
                        .transport()
                        .userauth_keyboard_interactive(challenge.user, &mut prompter);

                    match prompter.reply {
                        Some(Attempt::Aborted) => Attempt::Aborted,
                        Some(Attempt::Declined) => Attempt::Declined,
                        _ => check(res)?,
                    }
                }
                AuthMethod::Other(_) => return Ok(MethodState::Unsupported),
            };

            match outcome {
                Attempt::Accepted => return Ok(MethodState::Succeeded),
                Attempt::Declined => return Ok(MethodState::Declined),
                Attempt::Aborted => return Ok(MethodState::Aborted),
                Attempt::Rejected => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(%method, attempt, budget, "credential rejected");
                }
            }
        }

        Ok(MethodState::Exhausted)
    }
}

/// Authenticate `session` as `user`.
///
/// Returns [`Error::Aborted`] as soon as the supplier aborts and
/// [`Error::Authentication`] once every offered method is exhausted,
/// declined or unsupported.
pub fn authenticate<T, S>(session: &Session<T>, user: &str, supplier: &mut S) -> Result<(), Error>
where
    T: Transport,
    S: CredentialSupplier + ?Sized,
{
    Negotiation::new(user).run(session, supplier)
}

/// Whether the transport refused the credential, as opposed to failing.
fn is_rejection(err: &TransportError) -> bool {
    matches!(
        err.code(),
        TransportErrorCode::Session(AUTHENTICATION_FAILED | PUBLICKEY_UNVERIFIED)
    )
}

fn check(res: Result<(), TransportError>) -> Result<Attempt, Error> {
    match res {
        Ok(()) => Ok(Attempt::Accepted),
        Err(err) if is_rejection(&err) => Ok(Attempt::Rejected),
        Err(err) => Err(err.into()),
    }
}

/// Forwards keyboard-interactive prompts to the supplier.
///
/// The transport cannot be told to stop from inside the exchange, so a
/// decline or abort is answered with no responses and remembered until the
/// transport call returns.
struct Prompter<'s, S: ?Sized> {
    supplier: &'s mut S,
    challenge: Challenge<'s>,
    reply: Option<Attempt>,
}

impl<S: CredentialSupplier + ?Sized> KeyboardInteractivePrompt for Prompter<'_, S> {
    fn prompt(
        &mut self,
        _username: &str,
        instructions: &str,
        prompts: &[Prompt<'_>],
    ) -> Vec<String> {
        if self.reply.is_some() {
            return Vec::new();
        }

        // Some servers send an informational round with nothing to answer.
        if prompts.is_empty() {
            return Vec::new();
        }

        match self
            .supplier
            .offer_keyboard_interactive(&self.challenge, instructions, prompts)
        {
            Reply::Credential(responses) => responses,
            Reply::NextMethod => {
                self.reply = Some(Attempt::Declined);
                Vec::new()
            }
            Reply::Abort => {
                self.reply = Some(Attempt::Aborted);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted(Vec<Reply<Vec<String>>>);

    impl CredentialSupplier for Scripted {
        fn offer_password(&mut self, _challenge: &Challenge<'_>) -> Reply<String> {
            Reply::Abort
        }

        fn offer_keyboard_interactive(
            &mut self,
            _challenge: &Challenge<'_>,
            _instructions: &str,
            _prompts: &[Prompt<'_>],
        ) -> Reply<Vec<String>> {
            self.0.remove(0)
        }
    }

    fn password_prompt() -> Vec<Prompt<'static>> {
        vec![Prompt {
            text: "Password: ".into(),
            echo: false,
        }]
    }

    fn prompter(supplier: &mut Scripted) -> Prompter<'_, Scripted> {
        Prompter {
            supplier,
            challenge: Challenge {
                user: "swish",
                attempt: 1,
                budget: 1,
            },
            reply: None,
        }
    }

    #[test]
    fn summary_lists_methods_in_server_order() {
        let mut negotiation = Negotiation::new("swish");
        assert_eq!(
            negotiation.summary(),
            "server offered no authentication method"
        );

        negotiation.methods = vec![
            (AuthMethod::PublicKey, MethodState::Declined),
            (AuthMethod::Other("hostbased".into()), MethodState::Unsupported),
            (AuthMethod::Password, MethodState::Exhausted),
        ];
        assert_eq!(
            negotiation.summary(),
            "publickey: declined, hostbased: unsupported, password: exhausted"
        );
    }

    #[test]
    fn prompter_forwards_responses() {
        let mut supplier = Scripted(vec![Reply::Credential(vec!["secret".into()])]);
        let mut prompter = prompter(&mut supplier);

        assert_eq!(prompter.prompt("swish", "", &password_prompt()), ["secret"]);
        assert!(prompter.reply.is_none());
    }

    #[test]
    fn prompter_remembers_abort_and_stops_asking() {
        let mut supplier = Scripted(vec![Reply::Abort]);
        let mut prompter = prompter(&mut supplier);

        assert!(prompter.prompt("swish", "", &password_prompt()).is_empty());
        assert!(matches!(prompter.reply, Some(Attempt::Aborted)));

        // The script is empty now, asking again would panic.
        assert!(prompter.prompt("swish", "", &password_prompt()).is_empty());
    }

    #[test]
    fn prompter_skips_rounds_without_prompts() {
        let mut supplier = Scripted(Vec::new());
        let mut prompter = prompter(&mut supplier);

        assert!(prompter.prompt("swish", "Welcome", &[]).is_empty());
        assert!(prompter.reply.is_none());
    }

    #[test]
    fn only_auth_failures_count_as_rejections() {
        assert!(is_rejection(&TransportError::session(
            AUTHENTICATION_FAILED,
            "Authentication failed"
        )));
        assert!(is_rejection(&TransportError::session(
            PUBLICKEY_UNVERIFIED,
            "Username/PublicKey combination invalid"
        )));
        assert!(!is_rejection(&TransportError::session(-7, "Unable to send")));
    }
}
