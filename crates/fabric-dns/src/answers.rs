use std::collections::HashMap;
use std::net::IpAddr;

use dns_responder::{QuestionHandler, Responder};
use dns_types::protocol::types::*;

use crate::metrics;
use crate::settings::Settings;

/// Everything known about one name.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
struct Entry {
    addresses: Vec<IpAddr>,
    mx: Option<Responder>,
    ns: Option<Responder>,
}

/// Answers questions from a fixed set of records.
///
/// Names are matched case-insensitively, but answers are given for
/// the name exactly as it was asked.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct StaticAnswers {
    entries: HashMap<DomainName, Entry>,
    refuse_unknown: bool,
}

impl StaticAnswers {
    pub fn new(settings: &Settings) -> Self {
        let mut entries = HashMap::<DomainName, Entry>::with_capacity(settings.records.len());

        for record in &settings.records {
            let entry = entries.entry(record.name.domain.to_lowercase()).or_default();

            entry
                .addresses
                .extend(record.a.iter().copied().map(IpAddr::V4));
            entry
                .addresses
                .extend(record.aaaa.iter().copied().map(IpAddr::V6));

            if let Some(mx) = &record.mx {
                entry.mx = Some(Responder::MX {
                    preference: mx.preference,
                    host: mx.host.domain.clone(),
                });
            }
            if let Some(ns) = &record.ns {
                entry.ns = Some(Responder::NS {
                    nameserver: ns.nameserver.domain.clone(),
                    addresses: ns.addresses.clone(),
                });
            }
        }

        Self {
            entries,
            refuse_unknown: settings.refuse_unknown,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn answer_addresses(
        entry: &Entry,
        responder: &Responder,
        response: &mut Message,
        question: &Question,
    ) {
        let wants_v4 = *responder == Responder::A;
        for address in &entry.addresses {
            if address.is_ipv4() == wants_v4 {
                answer(responder, response, question, Some(*address));
            }
        }
    }
}

impl QuestionHandler for StaticAnswers {
    fn respond_to(&self, response: &mut Message, question: &Question) {
        if !RecordClass::IN.matches(question.qclass) {
            tracing::debug!("refusing non-IN question");
            answer(&Responder::Refusal, response, question, None);
            return;
        }

        let Some(entry) = self.entries.get(&question.name.to_lowercase()) else {
            if self.refuse_unknown {
                tracing::debug!("refusing question for unknown name");
                answer(&Responder::Refusal, response, question, None);
            } else {
                response.header.rcode = Rcode::NameError;
            }
            return;
        };

        match question.qtype {
            QueryType::Record(RecordType::A) => {
                Self::answer_addresses(entry, &Responder::A, response, question);
            }
            QueryType::Record(RecordType::AAAA) => {
                Self::answer_addresses(entry, &Responder::AAAA, response, question);
            }
            QueryType::Record(RecordType::MX) => {
                if let Some(mx) = &entry.mx {
                    answer(mx, response, question, None);
                }
            }
            QueryType::Record(RecordType::NS) => {
                if let Some(ns) = &entry.ns {
                    answer(ns, response, question, None);
                }
            }
            QueryType::Wildcard => {
                Self::answer_addresses(entry, &Responder::A, response, question);
                Self::answer_addresses(entry, &Responder::AAAA, response, question);
                for responder in [&entry.mx, &entry.ns].into_iter().flatten() {
                    answer(responder, response, question, None);
                }
            }
            _ => (),
        }
    }
}

fn answer(
    responder: &Responder,
    response: &mut Message,
    question: &Question,
    address: Option<IpAddr>,
) {
    if let Err(error) = responder.answer_for(response, question, address) {
        metrics::DNS_RESOLUTION_FAILURES_TOTAL.inc();
        tracing::debug!(%error, "could not answer question");
    }
}
