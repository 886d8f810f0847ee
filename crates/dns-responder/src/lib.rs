#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
// Don't care enough to fix
#![allow(clippy::match_same_arms)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::wildcard_imports)]

pub mod answer;

pub use self::answer::{ResolutionFailure, Responder};

use dns_types::protocol::types::{Message, Question, Rcode};

/// Whatever decides how a question gets answered.  It fills in the
/// response, usually by picking a `Responder` and calling
/// `Responder::answer_for`.
pub trait QuestionHandler {
    fn respond_to(&self, response: &mut Message, question: &Question);
}

impl<F> QuestionHandler for F
where
    F: Fn(&mut Message, &Question),
{
    fn respond_to(&self, response: &mut Message, question: &Question) {
        self(response, question);
    }
}

/// Build the response to a query, handing each question to the
/// handler in turn.  A refusal ends the response: later questions are
/// not looked at.
pub fn respond<H: QuestionHandler + ?Sized>(handler: &H, query: &Message) -> Message {
    let mut response = query.make_response();

    for question in &query.questions {
        if response.header.rcode == Rcode::Refused {
            tracing::debug!(%question, "skipping question after refusal");
            break;
        }

        let _span = tracing::error_span!("respond_to", %question).entered();
        handler.respond_to(&mut response, question);
        tracing::debug!(
            rcode = %response.header.rcode,
            answers = response.answers.len(),
            additional = response.additional.len(),
            "answered"
        );
    }

    response
}
