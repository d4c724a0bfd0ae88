use bson::{Bson, Document, doc};

use super::{Clause, Criteria, FieldClause, Logical, NearPoint, Operator};
use crate::error::{CriteriaError, CriteriaResult};

fn invalid<T>(message: String) -> CriteriaResult<T> {
    Err(CriteriaError::InvalidApiUsage(message))
}

/// Walks a [`Criteria`] tree clause by clause.
///
/// Implementations produce one output per clause and combine them in
/// [`visit_chain`](CriteriaVisitor::visit_chain).
pub trait CriteriaVisitor {
    type Output;

    fn visit_field(&mut self, clause: &FieldClause) -> CriteriaResult<Self::Output>;
    fn visit_logical(
        &mut self,
        logical: Logical,
        members: &[Criteria],
    ) -> CriteriaResult<Self::Output>;
    fn visit_raw(&mut self, document: &Document) -> CriteriaResult<Self::Output>;
    fn visit_chain(&mut self, outputs: Vec<Self::Output>) -> CriteriaResult<Self::Output>;

    /// Called with the errors recorded while building, before any clause is visited.
    fn visit_errors(&mut self, _errors: &[CriteriaError]) -> CriteriaResult<()> {
        Ok(())
    }

    fn visit_clause(&mut self, clause: &Clause) -> CriteriaResult<Self::Output> {
        match clause {
            Clause::Field(field) => self.visit_field(field),
            Clause::Logical(logical, members) => self.visit_logical(*logical, members),
            Clause::Raw(document) => self.visit_raw(document),
        }
    }

    fn visit_criteria(&mut self, criteria: &Criteria) -> CriteriaResult<Self::Output> {
        self.visit_errors(criteria.errors())?;

        let outputs = criteria
            .clauses()
            .iter()
            .map(|clause| self.visit_clause(clause))
            .collect::<CriteriaResult<Vec<_>>>()?;

        self.visit_chain(outputs)
    }
}

/// Renders criteria into filter documents.
pub struct DocumentRenderer;

impl DocumentRenderer {
    fn render_operators(&mut self, clause: &FieldClause) -> CriteriaResult<Document> {
        let operators = &clause.operators;
        let near = operators.iter().find_map(|op| match op {
            Operator::Near { point, .. } => Some(point),
            _ => None,
        });
        let has_distance = operators
            .iter()
            .any(|op| matches!(op, Operator::MinDistance(_) | Operator::MaxDistance(_)));

        if has_distance && near.is_none() {
            return invalid(format!(
                "min/max distance on '{}' requires 'near' or 'near_sphere'",
                clause.path
            ));
        }

        let geojson_near = matches!(near, Some(NearPoint::GeoJson(_)));
        let mut rendered = Document::new();

        for operator in operators {
            match operator {
                Operator::MinDistance(_) | Operator::MaxDistance(_) if geojson_near => continue,
                Operator::Near {
                    point: NearPoint::GeoJson(geometry),
                    ..
                } => {
                    let mut near_doc = doc! { "$geometry": geometry.to_document() };
                    for distance in operators {
                        if let Operator::MinDistance(d) | Operator::MaxDistance(d) = distance {
                            near_doc.insert(distance.key(), *d);
                        }
                    }
                    rendered.insert(operator.key(), near_doc);
                }
                _ => self.write_operator(operator, &mut rendered)?,
            }
        }

        Ok(rendered)
    }

    fn write_operator(&mut self, operator: &Operator, out: &mut Document) -> CriteriaResult<()> {
        let key = operator.key();

        match operator {
            Operator::Eq(value)
            | Operator::Ne(value)
            | Operator::Gt(value)
            | Operator::Gte(value)
            | Operator::Lt(value)
            | Operator::Lte(value) => {
                out.insert(key, value.clone());
            }
            Operator::In(values) | Operator::Nin(values) | Operator::All(values) => {
                out.insert(key, Bson::Array(values.clone()));
            }
            Operator::Mod { divisor, remainder } => {
                out.insert(key, vec![Bson::Int64(*divisor), Bson::Int64(*remainder)]);
            }
            Operator::Size(size) => {
                out.insert(key, Bson::Int64(*size));
            }
            Operator::Exists(exists) => {
                out.insert(key, *exists);
            }
            Operator::Type(types) => match types.as_slice() {
                [single] => {
                    out.insert(key, single.alias());
                }
                _ => {
                    out.insert(
                        key,
                        types
                            .iter()
                            .map(|t| Bson::String(t.alias().to_string()))
                            .collect::<Vec<_>>(),
                    );
                }
            },
            Operator::Regex { pattern, options } => {
                out.insert(key, pattern.as_str());
                if !options.is_empty() {
                    out.insert("$options", options.as_str());
                }
            }
            Operator::ElemMatch(criteria) => {
                out.insert(key, self.visit_criteria(criteria)?);
            }
            Operator::Not(inner) => {
                let mut negated = Document::new();
                self.write_operator(inner, &mut negated)?;
                out.insert(key, negated);
            }
            Operator::GeoWithin(shape) => {
                out.insert(key, shape.to_document());
            }
            Operator::Near { point, .. } => match point {
                NearPoint::Legacy(point) => {
                    out.insert(key, point.to_bson());
                }
                NearPoint::GeoJson(geometry) => {
                    out.insert(key, doc! { "$geometry": geometry.to_document() });
                }
            },
            Operator::MinDistance(distance) | Operator::MaxDistance(distance) => {
                out.insert(key, *distance);
            }
            Operator::GeoIntersects(geometry) => {
                out.insert(key, doc! { "$geometry": geometry.to_document() });
            }
            Operator::Bits(_, mask) => {
                out.insert(key, mask.to_bson());
            }
        }

        Ok(())
    }
}

impl CriteriaVisitor for DocumentRenderer {
    type Output = Document;

    fn visit_errors(&mut self, errors: &[CriteriaError]) -> CriteriaResult<()> {
        match errors.first() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn visit_field(&mut self, clause: &FieldClause) -> CriteriaResult<Self::Output> {
        if clause.pending_not {
            return invalid(format!(
                "'not' on '{}' is not followed by an operator",
                clause.path
            ));
        }

        // Key-less clauses (element criteria) render their operators in place.
        if clause.path.is_empty() {
            return self.render_operators(clause);
        }

        match clause.operators.as_slice() {
            [] => invalid(format!("no operator given for '{}'", clause.path)),
            [Operator::Eq(value)] => Ok(doc! { clause.path.as_str(): value.clone() }),
            _ => Ok(doc! { clause.path.as_str(): self.render_operators(clause)? }),
        }
    }

    fn visit_logical(
        &mut self,
        logical: Logical,
        members: &[Criteria],
    ) -> CriteriaResult<Self::Output> {
        if members.is_empty() {
            return invalid(format!(
                "{} requires a non-empty list of criteria",
                logical.key()
            ));
        }

        Ok(doc! {
            logical.key(): members
                .iter()
                .map(|member| self.visit_criteria(member))
                .collect::<CriteriaResult<Vec<_>>>()?,
        })
    }

    fn visit_raw(&mut self, document: &Document) -> CriteriaResult<Self::Output> {
        Ok(document.clone())
    }

    fn visit_chain(&mut self, outputs: Vec<Self::Output>) -> CriteriaResult<Self::Output> {
        let mut merged = Document::new();

        for fragment in outputs {
            for (key, value) in fragment {
                if let Some(existing) = merged.get(&key) {
                    return invalid(format!(
                        "can't add a second '{key}' expression specified as '{key} : {value}'; \
                         criteria already contains '{key} : {existing}'"
                    ));
                }
                merged.insert(key, value);
            }
        }

        Ok(merged)
    }
}

/// Collects the top-level keys a criteria renders.
pub struct KeyCollector;

impl CriteriaVisitor for KeyCollector {
    type Output = Vec<String>;

    fn visit_field(&mut self, clause: &FieldClause) -> CriteriaResult<Self::Output> {
        if clause.path.is_empty() {
            return Ok(clause
                .operators
                .iter()
                .map(|op| op.key().to_string())
                .collect());
        }

        Ok(vec![clause.path.clone()])
    }

    fn visit_logical(
        &mut self,
        logical: Logical,
        _members: &[Criteria],
    ) -> CriteriaResult<Self::Output> {
        Ok(vec![logical.key().to_string()])
    }

    fn visit_raw(&mut self, document: &Document) -> CriteriaResult<Self::Output> {
        Ok(document.keys().cloned().collect())
    }

    fn visit_chain(&mut self, outputs: Vec<Self::Output>) -> CriteriaResult<Self::Output> {
        Ok(outputs.into_iter().flatten().collect())
    }
}
