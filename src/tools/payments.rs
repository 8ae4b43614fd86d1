//! Address book, payment models and SEPA payment instructions

use crate::tools::{
    bool_or, i64_or, object_schema, optional_i64, required_i64, required_str, str_or,
    BankApiClient, BankRequest, EndpointTool, Tool,
};
use crate::Result;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn tools(bank: &Arc<BankApiClient>) -> Vec<Arc<dyn Tool>> {
    let paging = json!({
        "owner_reference": {"type": "string", "description": "Business contact number of the owner"},
        "owner_class": {"type": "string", "default": "BUSINESS_CONTACT"},
        "include_total_number_of_elements": {"type": "boolean", "default": true},
        "page_number": {"type": "integer", "default": 1},
        "page_size": {"type": "integer", "default": 100},
        "search_string": {"type": "string", "default": ""},
        "timestamp": {"type": "integer"}
    });

    vec![
        EndpointTool::new(
            bank,
            "fetch_address_book",
            "Fetches the payments address book (saved beneficiaries) for a customer.",
            object_schema(paging.clone(), &["owner_reference"]),
            build_payment_models,
        ),
        EndpointTool::new(
            bank,
            "fetch_payment_models_query",
            "Searches payment models (saved beneficiaries and templates) with query parameters.",
            object_schema(paging, &["owner_reference"]),
            build_payment_models,
        ),
        EndpointTool::new(
            bank,
            "fetch_account_number_formats",
            "Fetches payment account number formats for a given country and currency.",
            object_schema(
                json!({
                    "country_iso_codes": {"type": "string", "default": "NL"},
                    "currency_iso_code": {"type": "string", "default": "EUR"}
                }),
                &[],
            ),
            build_account_number_formats,
        ),
        EndpointTool::new(
            bank,
            "fetch_single_sepa_payment_instruction",
            "Creates a single SEPA payment request for executing a payment. \
             The customer approves it in their banking app.",
            object_schema(
                json!({
                    "ordering_party_name": {"type": "string"},
                    "ordering_account_number": {"type": "string"},
                    "contract_number": {"type": "string"},
                    "business_contact_number": {"type": "integer"},
                    "transaction_account_number": {"type": "string", "description": "Recipient IBAN"},
                    "transaction_counter_party_name": {"type": "string"},
                    "transaction_amount": {"type": "string", "description": "Decimal amount, e.g. \"50.00\""},
                    "transaction_currency_iso_code": {"type": "string", "default": "EUR"},
                    "transaction_remittance_info": {"type": "string", "default": ""},
                    "transaction_indication_urgent": {"type": "boolean", "default": false},
                    "transaction_indication_immediate": {"type": "boolean", "default": true}
                }),
                &[
                    "ordering_party_name",
                    "ordering_account_number",
                    "contract_number",
                    "business_contact_number",
                    "transaction_account_number",
                    "transaction_counter_party_name",
                    "transaction_amount",
                ],
            ),
            build_sepa_payment_instruction,
        ),
        EndpointTool::new(
            bank,
            "fetch_payment_instruction_type_options",
            "Fetches which payment instruction types are possible between two accounts.",
            object_schema(
                json!({
                    "counter_account_number": {"type": "string"},
                    "ordering_account_number": {"type": "string"},
                    "counter_account_format": {"type": "string", "default": "IBAN"},
                    "counter_bank_country_iso_code": {"type": "string", "default": "NL"},
                    "ordering_account_currency_iso_code": {"type": "string", "default": "EUR"},
                    "transaction_currency_iso_code": {"type": "string", "default": "EUR"}
                }),
                &["counter_account_number", "ordering_account_number"],
            ),
            build_instruction_type_options,
        ),
        EndpointTool::new(
            bank,
            "fetch_account_holder_validation",
            "Validates that an IBAN belongs to the named account holder.",
            object_schema(
                json!({
                    "name": {"type": "string"},
                    "iban": {"type": "string"}
                }),
                &["name", "iban"],
            ),
            build_account_holder_validation,
        ),
    ]
}

fn build_payment_models(args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get("/paymentmodels")
        .query("ownerClass", str_or(args, "owner_class", "BUSINESS_CONTACT"))
        .query("ownerReference", required_str(args, "owner_reference")?)
        .query(
            "includeTotalNumberOfElements",
            bool_or(args, "include_total_number_of_elements", true),
        )
        .query("pageNumber", i64_or(args, "page_number", 1))
        .query("pageSize", i64_or(args, "page_size", 100))
        .query("searchString", str_or(args, "search_string", ""))
        .query_opt("timestamp", optional_i64(args, "timestamp"))
        .header("x-aab-serviceversion", "v2"))
}

fn build_account_number_formats(args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get("/paymentaccountnumberformats")
        .query("countryIsoCodes", str_or(args, "country_iso_codes", "NL"))
        .query("currencyIsoCode", str_or(args, "currency_iso_code", "EUR")))
}

fn build_sepa_payment_instruction(args: &Value) -> Result<BankRequest> {
    let body = json!({
        "sepaPaymentInstruction": {
            "orderingParties": [{
                "type": "DEBTOR",
                "name": required_str(args, "ordering_party_name")?
            }],
            "accountNumber": required_str(args, "ordering_account_number")?,
            "accountCurrency": str_or(args, "ordering_account_currency", "EUR"),
            "buildingBlockId": i64_or(args, "building_block_id", 5),
            "contractNumber": required_str(args, "contract_number")?,
            "businessContactNumber": required_i64(args, "business_contact_number")?,
            "@resourceType": "SepaCreditTransferPaymentInstruction",
            "paymentInstructionTransactionPart": {
                "@resourceType": "SepaPaymentInstructionTransactionPart",
                "accountNumber": required_str(args, "transaction_account_number")?,
                "counterParties": [{
                    "type": "CREDITOR",
                    "name": required_str(args, "transaction_counter_party_name")?
                }],
                "currencyIsoCode": str_or(args, "transaction_currency_iso_code", "EUR"),
                "indicationUrgent": bool_or(args, "transaction_indication_urgent", false),
                "amount": required_str(args, "transaction_amount")?,
                "indicationImmediate": bool_or(args, "transaction_indication_immediate", true),
                "remittanceInfo": str_or(args, "transaction_remittance_info", ""),
                "remittanceInfoType": "UNSTRUCTURED"
            }
        }
    });

    Ok(
        BankRequest::post("/my-abnamro/api/payments/paymentinstructions/single/sepa")
            .query("supportFraudMessage", true)
            .query("continue", bool_or(args, "payment_continue", false))
            .header("x-aab-serviceversion", "v3")
            .json(body),
    )
}

fn build_instruction_type_options(args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::get("/paymentinstructiontypeoptions")
        .query("indicationGeoblockBlacklistCheck", true)
        .query("counterAccountFormat", str_or(args, "counter_account_format", "IBAN"))
        .query("counterAccountNumber", required_str(args, "counter_account_number")?)
        .query(
            "counterBankCountryIsoCode",
            str_or(args, "counter_bank_country_iso_code", "NL"),
        )
        .query(
            "orderingAccountCurrencyIsoCode",
            str_or(args, "ordering_account_currency_iso_code", "EUR"),
        )
        .query("orderingAccountNumber", required_str(args, "ordering_account_number")?)
        .query(
            "transactionCurrencyIsoCode",
            str_or(args, "transaction_currency_iso_code", "EUR"),
        ))
}

fn build_account_holder_validation(args: &Value) -> Result<BankRequest> {
    Ok(BankRequest::post("/paymentaccountholdervalidation").json(json!({
        "paymentaccountholder": {
            "name": required_str(args, "name")?,
            "iban": required_str(args, "iban")?
        }
    })))
}
